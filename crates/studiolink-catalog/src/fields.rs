//! UI field shapes handed to the control surface.
//!
//! The surface renders the fields; this module only decides which shape a
//! parameter gets and what it is prefilled with.

use serde::Serialize;
use serde_json::Value;

use crate::model::{Parameter, ParameterProperty, ParameterType};
use crate::options::{self, Choice, OptionTopic, OptionsCache, DEFAULT_CHOICE_ID};

/// Bounds used when a numeric parameter has no declared range.
const MIN_SAFE_INTEGER: f64 = -9_007_199_254_740_991.0;
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// When a field is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Always,
    /// Only while the value-adjust mode is "expression".
    ExpressionMode,
    /// Only while the value-adjust mode is "fixed value".
    FixedMode,
}

/// Input shape of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldShape {
    Number { default: f64, min: f64, max: f64 },
    Text { default: Option<String>, expression: bool },
    Checkbox { default: bool },
    Dropdown { choices: Vec<Choice>, default: Value },
}

/// One field of a control definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlField {
    pub id: String,
    pub label: String,
    pub visibility: Visibility,
    #[serde(flatten)]
    pub shape: FieldShape,
}

/// Build the fields for one parameter.
///
/// Value-adjust parameters get a mode checkbox and an expression field in
/// front of the fixed number field.
pub fn fields_for(
    param: &Parameter,
    request_type: &str,
    cache: &OptionsCache,
    value_adjust: bool,
) -> Vec<ControlField> {
    let name = param.display_name();

    match param.kind {
        ParameterType::Number => {
            let label = match param.range {
                Some(range) => format!("{name} (min {}, max {})", range.min, range.max),
                None => name.clone(),
            };
            let default = param
                .default_value
                .as_ref()
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let number = ControlField {
                id: param.id.clone(),
                label,
                visibility: if value_adjust {
                    Visibility::FixedMode
                } else {
                    Visibility::Always
                },
                shape: FieldShape::Number {
                    default,
                    min: param.range.map_or(MIN_SAFE_INTEGER, |r| r.min),
                    max: param.range.map_or(MAX_SAFE_INTEGER, |r| r.max),
                },
            };

            if !value_adjust {
                return vec![number];
            }
            vec![
                ControlField {
                    id: crate::compiler::USE_EXPRESSION_FIELD_ID.to_string(),
                    label: "Use variables".to_string(),
                    visibility: Visibility::Always,
                    shape: FieldShape::Checkbox { default: false },
                },
                ControlField {
                    id: crate::compiler::expression_field_id(&param.id),
                    label: name,
                    visibility: Visibility::ExpressionMode,
                    shape: FieldShape::Text {
                        default: Some(format_number(default)),
                        expression: true,
                    },
                },
                number,
            ]
        }
        ParameterType::Text => vec![ControlField {
            id: param.id.clone(),
            label: name,
            visibility: Visibility::Always,
            shape: FieldShape::Text {
                default: param
                    .default_value
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_string),
                expression: false,
            },
        }],
        ParameterType::Boolean => vec![ControlField {
            id: param.id.clone(),
            label: name,
            visibility: Visibility::Always,
            shape: FieldShape::Checkbox {
                default: param
                    .default_value
                    .as_ref()
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
        }],
        ParameterType::Const | ParameterType::Select | ParameterType::Entity(_) => {
            let label = if param.property == ParameterProperty::Required {
                format!("{name} (required)")
            } else {
                name
            };
            vec![ControlField {
                id: param.id.clone(),
                label,
                visibility: Visibility::Always,
                shape: FieldShape::Dropdown {
                    choices: choices_for(param, request_type, cache),
                    default: Value::String(DEFAULT_CHOICE_ID.to_string()),
                },
            }]
        }
    }
}

fn choices_for(param: &Parameter, request_type: &str, cache: &OptionsCache) -> Vec<Choice> {
    if param.kind == ParameterType::Select {
        if let Some(closed) = param.closed_options() {
            return options::choices_from_options(&closed);
        }
    }
    match cache.get(&OptionTopic::new(request_type, &param.id)) {
        Some(cached) => options::choices_from_options(cached),
        None => options::placeholder_choices(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
