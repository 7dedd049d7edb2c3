//! Compiles the request catalog into binding descriptors.
//!
//! Every visible SET request becomes an action binding. GET requests whose
//! response carries a controllable value become feedback bindings that light
//! up from that value.

use serde::Serialize;

use crate::error::SchemaError;
use crate::fields::{self, ControlField};
use crate::model::{Catalog, Parameter, ParameterProperty, ParameterType, RequestDefinition, RequestMethod};
use crate::naming;
use crate::options::{OptionTopic, OptionsCache};

/// Id of the checkbox switching a value-adjust binding to expression mode.
pub const USE_EXPRESSION_FIELD_ID: &str = "useVariables";

/// Id of the expression field of a value-adjust parameter.
pub fn expression_field_id(param_id: &str) -> String {
    format!("{param_id}-vars")
}

/// Compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Catalog groups holding internal/administrative requests.
    pub skip_groups: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            skip_groups: vec!["commands".to_string()],
        }
    }
}

impl CompilerConfig {
    pub fn with_skip_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skip_groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Whether a binding drives the studio or reflects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingRole {
    Action,
    Feedback,
}

/// How a binding relates to remote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingKind {
    /// Fire-and-forget request.
    Plain,
    /// Flips a boolean read from the paired GET request.
    Toggle { param_id: String },
    /// Sets a number from a fixed value or an expression.
    ValueAdjust { param_id: String },
    /// Reflects a non-boolean remote value.
    Track { param_id: String },
}

impl BindingKind {
    /// Parameter whose remote value the binding caches.
    pub fn tracked_param(&self) -> Option<&str> {
        match self {
            BindingKind::Plain => None,
            BindingKind::Toggle { param_id }
            | BindingKind::ValueAdjust { param_id }
            | BindingKind::Track { param_id } => Some(param_id),
        }
    }
}

/// A compiled control definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingDescriptor {
    /// Request type the definition was compiled from.
    pub id: String,
    pub name: String,
    pub group: String,
    pub role: BindingRole,
    pub kind: BindingKind,
    /// The request sent on activation (actions) or watched (feedbacks).
    pub request: RequestDefinition,
    /// GET request reading the tracked value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_request: Option<RequestDefinition>,
    /// Notification topic carrying changes of the tracked value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Instance options that select which remote entity a control refers to.
    pub filter_params: Vec<String>,
    /// Feedback field holding the value that lights the control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value_field: Option<String>,
    pub fields: Vec<ControlField>,
    /// Parameters whose options must be fetched from the studio.
    pub option_topics: Vec<OptionTopic>,
}

impl BindingDescriptor {
    pub fn tracked_param(&self) -> Option<&str> {
        self.kind.tracked_param()
    }

    pub fn is_feedback(&self) -> bool {
        self.role == BindingRole::Feedback
    }
}

/// Output of one compiler run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompiledBindings {
    pub descriptors: Vec<BindingDescriptor>,
    #[serde(serialize_with = "serialize_errors")]
    pub rejected: Vec<SchemaError>,
}

fn serialize_errors<S: serde::Serializer>(errors: &[SchemaError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}

impl CompiledBindings {
    pub fn get(&self, id: &str) -> Option<&BindingDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &BindingDescriptor> {
        self.descriptors.iter().filter(|d| d.role == BindingRole::Action)
    }

    pub fn feedbacks(&self) -> impl Iterator<Item = &BindingDescriptor> {
        self.descriptors.iter().filter(|d| d.role == BindingRole::Feedback)
    }
}

/// Compile the catalog against the current option lists.
///
/// Each run produces a complete descriptor set; callers replace the previous
/// set with it.
pub fn compile(catalog: &Catalog, cache: &OptionsCache, config: &CompilerConfig) -> CompiledBindings {
    let mut out = CompiledBindings::default();

    for (group, requests) in catalog.groups() {
        if config.skip_groups.iter().any(|g| g == group) {
            continue;
        }
        for request in requests {
            if request.hidden {
                continue;
            }
            match request.method() {
                Some(RequestMethod::Set) => match compile_action(group, request, catalog, cache) {
                    Ok(descriptor) => out.descriptors.push(descriptor),
                    Err(e) => {
                        tracing::warn!(
                            event = "binding_rejected",
                            request_type = %request.request_type,
                            error = %e,
                            "Binding dropped"
                        );
                        out.rejected.push(e);
                    }
                },
                Some(RequestMethod::Get) => {
                    if let Some(descriptor) = compile_feedback(group, request, cache) {
                        out.descriptors.push(descriptor);
                    }
                }
                None => {
                    tracing::debug!(
                        request_type = %request.request_type,
                        "Request has no method, skipped"
                    );
                }
            }
        }
    }

    tracing::debug!(
        descriptors = out.descriptors.len(),
        rejected = out.rejected.len(),
        "Catalog compiled"
    );
    out
}

fn compile_action(
    group: &str,
    request: &RequestDefinition,
    catalog: &Catalog,
    cache: &OptionsCache,
) -> Result<BindingDescriptor, SchemaError> {
    let mut kind = BindingKind::Plain;
    let mut fields = Vec::new();
    let mut option_topics = Vec::new();

    for param in &request.request_params {
        if param.kind == ParameterType::Const {
            continue;
        }
        if param.is_toggle_source() {
            if kind == BindingKind::Plain {
                kind = BindingKind::Toggle {
                    param_id: param.id.clone(),
                };
            }
            continue;
        }
        let value_adjust = param.is_value_adjust() && kind == BindingKind::Plain;
        if value_adjust {
            kind = BindingKind::ValueAdjust {
                param_id: param.id.clone(),
            };
        }
        if param.needs_option_fetch() {
            option_topics.push(OptionTopic::new(&request.request_type, &param.id));
        }
        fields.extend(fields::fields_for(
            param,
            &request.request_type,
            cache,
            value_adjust,
        ));
    }

    let value_request = match &kind {
        BindingKind::Plain | BindingKind::Track { .. } => None,
        BindingKind::Toggle { param_id } => {
            let expected = naming::paired_request_type(&request.request_type, RequestMethod::Get)
                .ok_or_else(|| SchemaError::UnpairableRequestType {
                    request_type: request.request_type.clone(),
                })?;
            match catalog.find(&expected) {
                Some(get) => Some(get.clone()),
                None => {
                    return Err(SchemaError::MissingGetRequest {
                        request_type: request.request_type.clone(),
                        param_id: param_id.clone(),
                        expected,
                    })
                }
            }
        }
        BindingKind::ValueAdjust { .. } => {
            naming::paired_request_type(&request.request_type, RequestMethod::Get)
                .and_then(|expected| catalog.find(&expected))
                .cloned()
        }
    };

    let topic = kind
        .tracked_param()
        .map(|_| naming::notification_topic(&request.request_type));
    let filter_params = filter_params(&request.request_params, kind.tracked_param());

    Ok(BindingDescriptor {
        id: request.request_type.clone(),
        name: format!("{}: {}", naming::group_title(group), request.display_name()),
        group: group.to_string(),
        role: BindingRole::Action,
        kind,
        request: request.clone(),
        value_request,
        topic,
        filter_params,
        expected_value_field: None,
        fields,
        option_topics,
    })
}

fn compile_feedback(
    group: &str,
    request: &RequestDefinition,
    cache: &OptionsCache,
) -> Option<BindingDescriptor> {
    let controlled = request.response_params.iter().find(|p| {
        matches!(
            p.property,
            ParameterProperty::Controllable | ParameterProperty::Required
        )
    })?;
    let set_type = naming::paired_request_type(&request.request_type, RequestMethod::Set)?;

    let mut fields = Vec::new();
    let mut option_topics = Vec::new();
    for param in &request.request_params {
        if param.needs_option_fetch() {
            option_topics.push(OptionTopic::new(&request.request_type, &param.id));
        }
        fields.extend(fields::fields_for(param, &request.request_type, cache, false));
    }

    let (kind, expected_value_field) = if controlled.kind == ParameterType::Boolean {
        (
            BindingKind::Toggle {
                param_id: controlled.id.clone(),
            },
            None,
        )
    } else {
        if controlled.needs_option_fetch() {
            option_topics.push(OptionTopic::new(&request.request_type, &controlled.id));
        }
        fields.extend(fields::fields_for(
            controlled,
            &request.request_type,
            cache,
            false,
        ));
        (
            BindingKind::Track {
                param_id: controlled.id.clone(),
            },
            Some(controlled.id.clone()),
        )
    };

    Some(BindingDescriptor {
        id: request.request_type.clone(),
        name: format!("{}: {}", naming::group_title(group), request.display_name()),
        group: group.to_string(),
        role: BindingRole::Feedback,
        filter_params: filter_params(&request.request_params, None),
        kind,
        request: request.clone(),
        value_request: Some(request.clone()),
        topic: Some(naming::notification_topic(&set_type)),
        expected_value_field,
        fields,
        option_topics,
    })
}

/// Parameters identifying which remote entity an instance refers to.
fn filter_params(params: &[Parameter], tracked: Option<&str>) -> Vec<String> {
    params
        .iter()
        .filter(|p| p.kind != ParameterType::Const)
        .filter(|p| Some(p.id.as_str()) != tracked)
        .map(|p| p.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamOption;
    use crate::options::NO_OPTIONS_LABEL;
    use crate::FieldShape;
    use serde_json::json;

    const CATALOG: &str = r#"{
        "audiomixer.output": [
            { "requestType": "audiomixer.output.muted.set", "prettyName": "Mute output",
              "requestParams": [
                { "id": "output", "type": "AudioOutputName", "property": "required" },
                { "id": "muted", "type": "boolean", "property": "controllable" } ] },
            { "requestType": "audiomixer.output.muted.get", "prettyName": "Output muted",
              "requestParams": [
                { "id": "output", "type": "AudioOutputName", "property": "required" } ],
              "responseParams": [
                { "id": "muted", "type": "boolean", "property": "controllable" } ] },
            { "requestType": "audiomixer.output.volume.set", "prettyName": "Output volume",
              "requestParams": [
                { "id": "output", "type": "AudioOutputName", "property": "required" },
                { "id": "controllerValue", "type": "number", "property": "controllable",
                  "range": { "min": 0, "max": 100 } } ] }
        ],
        "program": [
            { "requestType": "SetDirectEditLayer", "prettyName": "Direct edit layer",
              "requestParams": [ { "id": "active", "type": "boolean", "property": "controllable" } ] },
            { "requestType": "SetCurrentSceneByIndex", "prettyName": "Program scene",
              "requestParams": [
                { "id": "sceneIndex", "type": "SceneIndex", "property": "required" },
                { "id": "mode", "type": "const", "property": "required", "defaultValue": "cut" } ] },
            { "requestType": "SetSecret", "hidden": true, "requestParams": [] },
            { "requestType": "GetProgramScene", "prettyName": "Program scene is",
              "responseParams": [ { "id": "sceneName", "type": "SceneName", "property": "controllable" } ] }
        ],
        "commands": [
            { "requestType": "commands.parameter.options.get", "requestParams": [] }
        ]
    }"#;

    fn compiled(cache: &OptionsCache) -> CompiledBindings {
        let catalog = Catalog::parse_json(CATALOG).unwrap();
        compile(&catalog, cache, &CompilerConfig::default())
    }

    #[test]
    fn eligible_requests_become_actions() {
        let out = compiled(&OptionsCache::new());
        let ids: Vec<&str> = out.actions().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "audiomixer.output.muted.set",
                "audiomixer.output.volume.set",
                "SetCurrentSceneByIndex",
            ]
        );
    }

    #[test]
    fn toggle_without_get_is_rejected() {
        let out = compiled(&OptionsCache::new());
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(
            out.rejected[0],
            SchemaError::MissingGetRequest {
                request_type: "SetDirectEditLayer".to_string(),
                param_id: "active".to_string(),
                expected: "GetDirectEditLayer".to_string(),
            }
        );
        assert!(out.get("SetDirectEditLayer").is_none());
    }

    #[test]
    fn toggle_binding_shape() {
        let out = compiled(&OptionsCache::new());
        let mute = out.get("audiomixer.output.muted.set").unwrap();
        assert_eq!(mute.name, "Audiomixer Output: Mute output");
        assert_eq!(
            mute.kind,
            BindingKind::Toggle {
                param_id: "muted".to_string()
            }
        );
        assert_eq!(
            mute.value_request.as_ref().map(|r| r.request_type.as_str()),
            Some("audiomixer.output.muted.get")
        );
        assert_eq!(mute.topic.as_deref(), Some("audiomixer.output.muted"));
        assert_eq!(mute.filter_params, ["output"]);
        // The toggled boolean has no field of its own.
        let ids: Vec<&str> = mute.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["output"]);
        assert_eq!(
            mute.option_topics,
            [OptionTopic::new("audiomixer.output.muted.set", "output")]
        );
    }

    #[test]
    fn value_adjust_binding_shape() {
        let out = compiled(&OptionsCache::new());
        let volume = out.get("audiomixer.output.volume.set").unwrap();
        assert_eq!(
            volume.kind,
            BindingKind::ValueAdjust {
                param_id: "controllerValue".to_string()
            }
        );
        // No GET pair in the catalog: allowed for value-adjust bindings.
        assert!(volume.value_request.is_none());
        let ids: Vec<&str> = volume.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            ["output", "useVariables", "controllerValue-vars", "controllerValue"]
        );
    }

    #[test]
    fn const_params_hidden_and_skips_applied() {
        let out = compiled(&OptionsCache::new());
        let scene = out.get("SetCurrentSceneByIndex").unwrap();
        assert_eq!(scene.kind, BindingKind::Plain);
        assert!(scene.topic.is_none());
        let ids: Vec<&str> = scene.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["sceneIndex"]);
        assert!(out.get("SetSecret").is_none());
        assert!(out.get("commands.parameter.options.get").is_none());
    }

    #[test]
    fn feedbacks_compiled_from_get_requests() {
        let out = compiled(&OptionsCache::new());
        let ids: Vec<&str> = out.feedbacks().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["audiomixer.output.muted.get", "GetProgramScene"]);

        let muted = out.get("audiomixer.output.muted.get").unwrap();
        assert!(muted.is_feedback());
        assert_eq!(muted.topic.as_deref(), Some("audiomixer.output.muted"));
        assert!(muted.expected_value_field.is_none());

        let scene = out.get("GetProgramScene").unwrap();
        assert_eq!(scene.topic.as_deref(), Some("SetProgramScene"));
        assert_eq!(scene.expected_value_field.as_deref(), Some("sceneName"));
        assert_eq!(
            scene.kind,
            BindingKind::Track {
                param_id: "sceneName".to_string()
            }
        );
    }

    #[test]
    fn cached_options_fill_dropdowns() {
        let before = compiled(&OptionsCache::new());
        let field = &before.get("SetCurrentSceneByIndex").unwrap().fields[0];
        match &field.shape {
            FieldShape::Dropdown { choices, .. } => assert_eq!(choices[0].label, NO_OPTIONS_LABEL),
            other => panic!("expected dropdown, got {other:?}"),
        }

        let mut cache = OptionsCache::new();
        cache.insert(
            OptionTopic::new("SetCurrentSceneByIndex", "sceneIndex"),
            vec![ParamOption {
                id: json!(0),
                label: "Intro".to_string(),
            }],
        );
        let after = compiled(&cache);
        let field = &after.get("SetCurrentSceneByIndex").unwrap().fields[0];
        match &field.shape {
            FieldShape::Dropdown { choices, .. } => {
                assert_eq!(choices.len(), 2);
                assert_eq!(choices[1].label, "Intro");
            }
            other => panic!("expected dropdown, got {other:?}"),
        }
    }

    #[test]
    fn recompiling_is_idempotent() {
        let cache = OptionsCache::new();
        assert_eq!(compiled(&cache).descriptors, compiled(&cache).descriptors);
    }

    #[test]
    fn custom_skip_list() {
        let catalog = Catalog::parse_json(CATALOG).unwrap();
        let config = CompilerConfig::default().with_skip_groups(["program", "commands"]);
        let out = compile(&catalog, &OptionsCache::new(), &config);
        assert!(out.get("SetCurrentSceneByIndex").is_none());
        assert!(out.rejected.is_empty());
    }
}
