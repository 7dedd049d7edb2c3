//! Catalog data model.
//!
//! The studio publishes its request catalog as a map from group name to the
//! requests in that group. Field names follow the studio's camelCase wire
//! format; older catalogs spell a few of them in snake_case, which the
//! aliases accept.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::naming;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "SET")]
    Set,
}

impl RequestMethod {
    /// The opposite method.
    pub fn swapped(self) -> Self {
        match self {
            RequestMethod::Get => RequestMethod::Set,
            RequestMethod::Set => RequestMethod::Get,
        }
    }
}

/// Semantic parameter type.
///
/// Types other than the primitive ones name an entity in the studio
/// (`SceneName`, `AudioOutputName`, ...) whose selectable values must be
/// fetched from the studio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParameterType {
    Const,
    Number,
    Boolean,
    Text,
    Select,
    Entity(String),
}

impl From<String> for ParameterType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "const" => ParameterType::Const,
            "number" => ParameterType::Number,
            "boolean" => ParameterType::Boolean,
            "string" => ParameterType::Text,
            "select" => ParameterType::Select,
            _ => ParameterType::Entity(s),
        }
    }
}

impl From<ParameterType> for String {
    fn from(t: ParameterType) -> Self {
        match t {
            ParameterType::Const => "const".to_string(),
            ParameterType::Number => "number".to_string(),
            ParameterType::Boolean => "boolean".to_string(),
            ParameterType::Text => "string".to_string(),
            ParameterType::Select => "select".to_string(),
            ParameterType::Entity(name) => name,
        }
    }
}

/// Parameter property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterProperty {
    Id,
    OptionalId,
    Required,
    #[default]
    Optional,
    Controllable,
    ReadOnlyControllable,
    Hidden,
    #[serde(other)]
    Unknown,
}

/// Numeric range of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// One selectable value of an enumerated parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamOption {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(alias = "value")]
    pub label: String,
}

/// A request or response parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter id; may be a dot path into the message (`mixer.muted`).
    pub id: String,
    #[serde(default, alias = "pretty_name", skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    #[serde(default)]
    pub property: ParameterProperty,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, alias = "default_value", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParamOption>,
}

impl Parameter {
    /// Human-readable name: the pretty name, or the id split at camel humps.
    pub fn display_name(&self) -> String {
        match &self.pretty_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => naming::camel_to_words(&self.id),
        }
    }

    pub fn is_required(&self) -> bool {
        self.property == ParameterProperty::Required
    }

    /// Boolean parameter whose value is flipped from the current remote state.
    pub fn is_toggle_source(&self) -> bool {
        self.kind == ParameterType::Boolean
            && matches!(
                self.property,
                ParameterProperty::Controllable | ParameterProperty::Required
            )
    }

    /// Numeric parameter that can be driven by a fixed value or an expression.
    pub fn is_value_adjust(&self) -> bool {
        self.kind == ParameterType::Number && self.property == ParameterProperty::Controllable
    }

    /// Closed value set declared in the catalog, if any.
    pub fn closed_options(&self) -> Option<Vec<ParamOption>> {
        if !self.options.is_empty() {
            return Some(self.options.clone());
        }
        if !self.values.is_empty() {
            return Some(
                self.values
                    .iter()
                    .map(|v| ParamOption {
                        id: serde_json::Value::String(v.clone()),
                        label: v.clone(),
                    })
                    .collect(),
            );
        }
        None
    }

    /// Whether selectable values have to be fetched from the studio.
    pub fn needs_option_fetch(&self) -> bool {
        match self.kind {
            ParameterType::Boolean
            | ParameterType::Text
            | ParameterType::Number
            | ParameterType::Const => false,
            ParameterType::Select => self.closed_options().is_none(),
            ParameterType::Entity(_) => true,
        }
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    #[serde(alias = "type")]
    pub request_type: String,
    /// Declared method; derived from the request type when absent.
    #[serde(rename = "method", default, skip_serializing_if = "Option::is_none")]
    pub declared_method: Option<RequestMethod>,
    #[serde(default, alias = "parameters")]
    pub request_params: Vec<Parameter>,
    #[serde(default)]
    pub response_params: Vec<Parameter>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, alias = "pretty_name", skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RequestDefinition {
    /// Effective method.
    pub fn method(&self) -> Option<RequestMethod> {
        self.declared_method
            .or_else(|| naming::method_of(&self.request_type))
    }

    pub fn display_name(&self) -> String {
        match &self.pretty_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.request_type.clone(),
        }
    }

    /// Look up a request parameter by id.
    pub fn request_param(&self, id: &str) -> Option<&Parameter> {
        self.request_params.iter().find(|p| p.id == id)
    }
}

/// The request catalog: group name to the requests in that group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    groups: BTreeMap<String, Vec<RequestDefinition>>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate request types.
    pub fn from_groups(
        groups: BTreeMap<String, Vec<RequestDefinition>>,
    ) -> Result<Self, CatalogError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (group, requests) in &groups {
            for request in requests {
                if let Some(first) = seen.insert(&request.request_type, group) {
                    return Err(CatalogError::DuplicateRequest {
                        request_type: request.request_type.clone(),
                        first: first.to_string(),
                        second: group.clone(),
                    });
                }
            }
        }
        Ok(Self { groups })
    }

    /// Parse a catalog from JSON.
    pub fn parse_json(input: &str) -> Result<Self, CatalogError> {
        let groups = serde_json::from_str(input).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_groups(groups)
    }

    /// Parse a catalog from YAML (which also accepts JSON).
    pub fn parse_yaml(input: &str) -> Result<Self, CatalogError> {
        let groups = serde_yaml::from_str(input).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_groups(groups)
    }

    /// Load a catalog file. `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let catalog = if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }?;

        tracing::debug!(
            path = %path.display(),
            groups = catalog.groups.len(),
            requests = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[RequestDefinition])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// All requests, in group order.
    pub fn requests(&self) -> impl Iterator<Item = &RequestDefinition> {
        self.groups.values().flatten()
    }

    /// Find a request by type.
    pub fn find(&self, request_type: &str) -> Option<&RequestDefinition> {
        self.requests().find(|r| r.request_type == request_type)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"{
        "audiomixer.output": [
            {
                "requestType": "audiomixer.output.muted.set",
                "prettyName": "Mute output",
                "requestParams": [
                    { "id": "output", "type": "AudioOutputName", "property": "required" },
                    { "id": "muted", "type": "boolean", "property": "controllable" }
                ]
            },
            {
                "requestType": "audiomixer.output.muted.get",
                "hidden": false,
                "requestParams": [
                    { "id": "output", "type": "AudioOutputName", "property": "required" }
                ],
                "responseParams": [
                    { "id": "muted", "type": "boolean", "property": "controllable" }
                ]
            }
        ],
        "program": [
            {
                "type": "SetProgramMuted",
                "method": "SET",
                "pretty_name": "Mute program",
                "parameters": [
                    { "id": "muted", "type": "boolean", "property": "controllable" }
                ]
            }
        ]
    }"#;

    #[test]
    fn parse_catalog_json() {
        let catalog = Catalog::parse_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.groups().count(), 2);

        let set = catalog.find("audiomixer.output.muted.set").unwrap();
        assert_eq!(set.method(), Some(RequestMethod::Set));
        assert_eq!(set.display_name(), "Mute output");
        assert_eq!(
            set.request_params[0].kind,
            ParameterType::Entity("AudioOutputName".to_string())
        );
        assert!(set.request_params[1].is_toggle_source());
    }

    #[test]
    fn parse_accepts_legacy_field_names() {
        let catalog = Catalog::parse_json(CATALOG).unwrap();
        let request = catalog.find("SetProgramMuted").unwrap();
        assert_eq!(request.declared_method, Some(RequestMethod::Set));
        assert_eq!(request.pretty_name.as_deref(), Some("Mute program"));
        assert_eq!(request.request_params.len(), 1);
    }

    #[test]
    fn parse_catalog_yaml() {
        let yaml = r#"
replays:
  - requestType: replays.slot.select.set
    requestParams:
      - id: slot
        type: select
        property: required
        values: ["all", "1", "2"]
"#;
        let catalog = Catalog::parse_yaml(yaml).unwrap();
        let request = catalog.find("replays.slot.select.set").unwrap();
        let slot = &request.request_params[0];
        assert_eq!(slot.kind, ParameterType::Select);
        assert!(!slot.needs_option_fetch());
        assert_eq!(slot.closed_options().unwrap().len(), 3);
    }

    #[test]
    fn duplicate_request_type_rejected() {
        let json = r#"{
            "a": [ { "requestType": "Foo.set" } ],
            "b": [ { "requestType": "Foo.set" } ]
        }"#;
        let err = Catalog::parse_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateRequest { .. }));
        assert!(err.to_string().contains("Foo.set"));
    }

    #[test]
    fn invalid_document_is_parse_error() {
        let err = Catalog::parse_json("[1, 2").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn unknown_property_is_tolerated() {
        let json = r#"{ "g": [ { "requestType": "X.set", "requestParams": [
            { "id": "a", "type": "number", "property": "something_new" }
        ] } ] }"#;
        let catalog = Catalog::parse_json(json).unwrap();
        let param = &catalog.find("X.set").unwrap().request_params[0];
        assert_eq!(param.property, ParameterProperty::Unknown);
    }

    #[test]
    fn option_fetch_rules() {
        let param = |kind: ParameterType| Parameter {
            id: "p".to_string(),
            pretty_name: None,
            property: ParameterProperty::Required,
            kind,
            range: None,
            default_value: None,
            values: vec![],
            options: vec![],
        };
        assert!(!param(ParameterType::Boolean).needs_option_fetch());
        assert!(!param(ParameterType::Text).needs_option_fetch());
        assert!(!param(ParameterType::Number).needs_option_fetch());
        assert!(!param(ParameterType::Const).needs_option_fetch());
        assert!(param(ParameterType::Select).needs_option_fetch());
        assert!(param(ParameterType::Entity("SceneName".into())).needs_option_fetch());
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let json = r#"{ "g": [ { "requestType": "X.set", "requestParams": [
            { "id": "controllerValue", "type": "number", "property": "controllable" }
        ] } ] }"#;
        let catalog = Catalog::parse_json(json).unwrap();
        let param = &catalog.find("X.set").unwrap().request_params[0];
        assert_eq!(param.display_name(), "Controller value");
        assert!(param.is_value_adjust());
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("catalog.json");
        std::fs::File::create(&json_path)
            .unwrap()
            .write_all(CATALOG.as_bytes())
            .unwrap();
        assert_eq!(Catalog::load(&json_path).unwrap().len(), 3);

        let yaml_path = dir.path().join("catalog.yaml");
        std::fs::write(&yaml_path, "g:\n  - requestType: A.set\n").unwrap();
        assert_eq!(Catalog::load(&yaml_path).unwrap().len(), 1);

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Catalog::load(&missing).unwrap_err(),
            CatalogError::Io(_)
        ));
    }
}
