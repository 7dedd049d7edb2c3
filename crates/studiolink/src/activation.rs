//! Building the SET request for a pressed control.

use serde_json::{Number, Value};

use studiolink_catalog::options::is_placeholder;
use studiolink_catalog::{
    expression_field_id, BindingDescriptor, BindingKind, Parameter, ParameterType,
    USE_EXPRESSION_FIELD_ID,
};

use crate::error::ActivationError;
use crate::protocol::Request;
use crate::state::{CachedValue, InstanceOptions};
use crate::surface::ControlSurface;

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Build the request a control sends when pressed.
///
/// Nothing is sent when this fails: toggles need a resolved current value,
/// value-adjust controls need a number, and required parameters must not be
/// left at the placeholder choice.
pub fn build_request(
    descriptor: &BindingDescriptor,
    cached: &CachedValue,
    options: &InstanceOptions,
    surface: &dyn ControlSurface,
) -> Result<Request, ActivationError> {
    let definition = &descriptor.request;
    let mut request = Request::new(&definition.request_type);

    for param in &definition.request_params {
        match &descriptor.kind {
            BindingKind::Toggle { param_id } if *param_id == param.id => {
                let current = cached
                    .as_bool()
                    .ok_or_else(|| ActivationError::ValueUnknown {
                        param_id: param.id.clone(),
                    })?;
                request.set(&param.id, !current);
                continue;
            }
            BindingKind::ValueAdjust { param_id } if *param_id == param.id => {
                let value = adjusted_value(param, cached, options, surface)?;
                request.set(&param.id, value);
                continue;
            }
            _ => {}
        }

        match options.get(&param.id) {
            None | Some(Value::Null) => {
                if param.kind == ParameterType::Const && param.is_required() {
                    if let Some(default) = &param.default_value {
                        request.set(&param.id, default.clone());
                    }
                }
            }
            Some(value) if is_placeholder(value) => {
                if param.is_required() {
                    return Err(ActivationError::RequiredParameterMissing {
                        request_type: definition.request_type.clone(),
                        param_id: param.id.clone(),
                    });
                }
            }
            Some(value) => request.set(&param.id, value.clone()),
        }
    }

    Ok(request)
}

/// Fixed number, or the evaluated expression in expression mode.
fn adjusted_value(
    param: &Parameter,
    cached: &CachedValue,
    options: &InstanceOptions,
    surface: &dyn ControlSurface,
) -> Result<Value, ActivationError> {
    let expression_mode = options
        .get(USE_EXPRESSION_FIELD_ID)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let raw = if expression_mode {
        let expression = options
            .get(&expression_field_id(&param.id))
            .and_then(Value::as_str)
            .unwrap_or_default();
        surface
            .evaluate_expression(expression, cached.as_value())
            .map_err(|message| ActivationError::InvalidExpression {
                param_id: param.id.clone(),
                message,
            })?
    } else {
        options
            .get(&param.id)
            .or(param.default_value.as_ref())
            .cloned()
            .unwrap_or(Value::Null)
    };

    to_number(&raw).ok_or_else(|| ActivationError::NotANumber {
        param_id: param.id.clone(),
        value: raw,
    })
}

/// Numbers and numeric strings, with whole numbers as integers.
fn to_number(value: &Value) -> Option<Value> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use serde_json::json;
    use studiolink_catalog::{compile, Catalog, CompiledBindings, CompilerConfig, OptionsCache};

    const CATALOG: &str = r#"{
        "audiomixer.output": [
            { "requestType": "audiomixer.output.muted.set",
              "requestParams": [
                { "id": "output", "type": "AudioOutputName", "property": "required" },
                { "id": "muted", "type": "boolean", "property": "controllable" } ] },
            { "requestType": "audiomixer.output.muted.get",
              "requestParams": [ { "id": "output", "type": "AudioOutputName", "property": "required" } ],
              "responseParams": [ { "id": "muted", "type": "boolean", "property": "controllable" } ] },
            { "requestType": "audiomixer.output.volume.set",
              "requestParams": [
                { "id": "output", "type": "AudioOutputName", "property": "required" },
                { "id": "controllerValue", "type": "number", "property": "controllable",
                  "range": { "min": 0, "max": 100 } } ] }
        ],
        "replays": [
            { "requestType": "SetReplaySpeed",
              "requestParams": [
                { "id": "channel", "type": "ReplayChannel", "property": "optional" },
                { "id": "speed", "type": "select", "property": "required", "values": ["slow", "fast"] },
                { "id": "mode", "type": "const", "property": "required", "defaultValue": "absolute" } ] }
        ]
    }"#;

    struct Expressions;

    impl ControlSurface for Expressions {
        fn define_controls(&self, _: &[BindingDescriptor]) {}
        fn check_controls(&self, _: &[String]) {}
        fn refresh_all(&self) {}
        fn status_changed(&self, _: ConnectionState, _: Option<&str>) {}
        fn evaluate_expression(&self, expression: &str, current: Option<&Value>) -> Result<Value, String> {
            match expression {
                "$(current) + 10" => Ok(json!(current.and_then(Value::as_f64).unwrap_or(0.0) + 10.0)),
                "$(label)" => Ok(json!("loud")),
                _ => Err("unknown variable".to_string()),
            }
        }
    }

    fn bindings() -> CompiledBindings {
        let catalog = Catalog::parse_json(CATALOG).unwrap();
        compile(&catalog, &OptionsCache::new(), &CompilerConfig::default())
    }

    fn options(value: Value) -> InstanceOptions {
        match value {
            Value::Object(map) => map,
            _ => panic!("options must be an object"),
        }
    }

    #[test]
    fn toggle_sends_negated_value() {
        let b = bindings();
        let mute = b.get("audiomixer.output.muted.set").unwrap();
        let request = build_request(
            mute,
            &CachedValue::Value(json!(true)),
            &options(json!({"output": "Main"})),
            &Expressions,
        )
        .unwrap();
        let value = request.into_value();
        assert_eq!(value["muted"], false);
        assert_eq!(value["output"], "Main");
    }

    #[test]
    fn toggle_with_unknown_value_aborts() {
        let b = bindings();
        let mute = b.get("audiomixer.output.muted.set").unwrap();
        let err = build_request(
            mute,
            &CachedValue::Unresolved,
            &options(json!({"output": "Main"})),
            &Expressions,
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::ValueUnknown { param_id } if param_id == "muted"));
    }

    #[test]
    fn value_adjust_fixed_and_expression() {
        let b = bindings();
        let volume = b.get("audiomixer.output.volume.set").unwrap();

        let fixed = build_request(
            volume,
            &CachedValue::Unresolved,
            &options(json!({"output": "Main", "controllerValue": "75"})),
            &Expressions,
        )
        .unwrap();
        assert_eq!(fixed.get("controllerValue"), Some(&json!(75)));

        let expr = build_request(
            volume,
            &CachedValue::Value(json!(40)),
            &options(json!({
                "output": "Main",
                "useVariables": true,
                "controllerValue-vars": "$(current) + 10",
                "controllerValue": 1
            })),
            &Expressions,
        )
        .unwrap();
        assert_eq!(expr.get("controllerValue"), Some(&json!(50)));
    }

    #[test]
    fn value_adjust_failures() {
        let b = bindings();
        let volume = b.get("audiomixer.output.volume.set").unwrap();

        let err = build_request(
            volume,
            &CachedValue::Unresolved,
            &options(json!({
                "output": "Main", "useVariables": true, "controllerValue-vars": "$(label)"
            })),
            &Expressions,
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::NotANumber { .. }));

        let err = build_request(
            volume,
            &CachedValue::Unresolved,
            &options(json!({
                "output": "Main", "useVariables": true, "controllerValue-vars": "$(nope)"
            })),
            &Expressions,
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::InvalidExpression { .. }));
    }

    #[test]
    fn required_placeholder_aborts() {
        let b = bindings();
        let speed = b.get("SetReplaySpeed").unwrap();
        let err = build_request(
            speed,
            &CachedValue::Unresolved,
            &options(json!({"speed": "default_option"})),
            &Expressions,
        )
        .unwrap_err();
        match err {
            ActivationError::RequiredParameterMissing {
                request_type,
                param_id,
            } => {
                assert_eq!(request_type, "SetReplaySpeed");
                assert_eq!(param_id, "speed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn optional_placeholder_skipped_and_const_defaulted() {
        let b = bindings();
        let speed = b.get("SetReplaySpeed").unwrap();
        let request = build_request(
            speed,
            &CachedValue::Unresolved,
            &options(json!({"channel": "default_option", "speed": "fast"})),
            &Expressions,
        )
        .unwrap();
        assert!(request.get("channel").is_none());
        assert_eq!(request.get("speed"), Some(&json!("fast")));
        assert_eq!(request.get("mode"), Some(&json!("absolute")));
    }

    #[test]
    fn number_coercion() {
        assert_eq!(to_number(&json!("12.5")), Some(json!(12.5)));
        assert_eq!(to_number(&json!(3.0)), Some(json!(3)));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(to_number(&json!(true)), None);
    }
}
