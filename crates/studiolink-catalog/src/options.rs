//! Cached option lists for enumerated parameters.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::model::ParamOption;

/// Choice id of the leading "nothing selected" entry of a dropdown.
pub const DEFAULT_CHOICE_ID: &str = "default_option";

/// Label of the leading "nothing selected" entry.
pub const DEFAULT_CHOICE_LABEL: &str = "Select an option...";

/// Label of the only entry shown while options are not fetched yet.
pub const NO_OPTIONS_LABEL: &str = "No options available.";

/// Identifies the option list of one parameter of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OptionTopic {
    pub request_type: String,
    pub param_id: String,
}

impl OptionTopic {
    pub fn new(request_type: impl Into<String>, param_id: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            param_id: param_id.into(),
        }
    }
}

impl fmt::Display for OptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.request_type, self.param_id)
    }
}

/// One entry of a dropdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub id: Value,
    pub label: String,
}

/// Last fetched option lists, keyed by topic.
///
/// Entries never expire; a re-fetch replaces them.
#[derive(Debug, Default, Clone)]
pub struct OptionsCache {
    entries: HashMap<OptionTopic, Vec<ParamOption>>,
}

impl OptionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: OptionTopic, options: Vec<ParamOption>) {
        self.entries.insert(topic, options);
    }

    pub fn get(&self, topic: &OptionTopic) -> Option<&[ParamOption]> {
        self.entries.get(topic).map(Vec::as_slice)
    }

    pub fn contains(&self, topic: &OptionTopic) -> bool {
        self.entries.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Dropdown choices for a known option list, led by the default choice.
pub fn choices_from_options(options: &[ParamOption]) -> Vec<Choice> {
    let mut choices = Vec::with_capacity(options.len() + 1);
    choices.push(Choice {
        id: Value::String(DEFAULT_CHOICE_ID.to_string()),
        label: DEFAULT_CHOICE_LABEL.to_string(),
    });
    choices.extend(options.iter().map(|option| Choice {
        id: match &option.id {
            Value::Null => Value::String("undefined".to_string()),
            id => id.clone(),
        },
        label: option.label.clone(),
    }));
    choices
}

/// The single placeholder choice shown until options are fetched.
pub fn placeholder_choices() -> Vec<Choice> {
    vec![Choice {
        id: Value::from(0),
        label: NO_OPTIONS_LABEL.to_string(),
    }]
}

/// Whether an option value is the unselected placeholder.
pub fn is_placeholder(value: &Value) -> bool {
    value.as_str() == Some(DEFAULT_CHOICE_ID)
}
