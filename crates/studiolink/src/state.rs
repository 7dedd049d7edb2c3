//! Per-control binding state.
//!
//! Every live control instance has one entry holding the last known remote
//! value of the parameter it tracks, plus the instance options that pick
//! out which remote entity it refers to.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};

use studiolink_catalog::options::is_placeholder;
use studiolink_catalog::{BindingDescriptor, ParameterType};

use crate::protocol::{Notification, Request};
use crate::registry::SubscriptionRegistry;

/// Options the host chose for one control instance, keyed by field id.
pub type InstanceOptions = Map<String, Value>;

/// Last known remote value of a tracked parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CachedValue {
    #[default]
    Unresolved,
    Value(Value),
}

impl CachedValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            CachedValue::Unresolved => None,
            CachedValue::Value(v) => Some(v),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }
}

/// A GET request that reads the current value for one control.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFetch {
    pub control_id: String,
    /// Response field holding the value.
    pub tracked_param: String,
    pub request: Request,
}

/// State of one live control instance.
#[derive(Debug, Clone)]
pub struct BindingStateEntry {
    pub control_id: String,
    pub definition_id: String,
    pub topic: Option<String>,
    pub tracked_param: Option<String>,
    pub cached: CachedValue,
    /// Notification fields that must match for this control to update.
    pub filter: Map<String, Value>,
    pub is_feedback: bool,
    pub options: InstanceOptions,
    pub expected_value_field: Option<String>,
    fetch: Option<ValueFetch>,
}

impl BindingStateEntry {
    fn new(
        control_id: &str,
        descriptor: &BindingDescriptor,
        options: &InstanceOptions,
        is_feedback: bool,
    ) -> Self {
        let tracked_param = descriptor.tracked_param().map(str::to_string);
        let topic = tracked_param.as_ref().and(descriptor.topic.clone());
        let filter = descriptor
            .filter_params
            .iter()
            .filter_map(|id| {
                options
                    .get(id)
                    .filter(|v| !v.is_null())
                    .map(|v| (id.clone(), v.clone()))
            })
            .collect();

        Self {
            control_id: control_id.to_string(),
            definition_id: descriptor.id.clone(),
            topic,
            tracked_param,
            cached: CachedValue::Unresolved,
            filter,
            is_feedback,
            options: options.clone(),
            expected_value_field: descriptor.expected_value_field.clone(),
            fetch: value_fetch(control_id, descriptor, options),
        }
    }

    /// Whether every filter field equals the notification's field at the
    /// same path.
    pub fn matches(&self, notification: &Notification) -> bool {
        self.filter
            .iter()
            .all(|(path, expected)| notification.get(path) == Some(expected))
    }

    /// Lit state of a feedback: booleans light when true, tracked values
    /// when they equal the expected value the host configured.
    pub fn is_active(&self) -> bool {
        let Some(value) = self.cached.as_value() else {
            return false;
        };
        match &self.expected_value_field {
            Some(field) => self.options.get(field) == Some(value),
            None => value.as_bool() == Some(true),
        }
    }
}

/// What the caller has to do after a subscribe.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribeOutcome {
    /// Fetch to issue so the cached value gets resolved.
    pub fetch: Option<ValueFetch>,
    /// Topic that just gained its first subscriber.
    pub register_topic: Option<String>,
    /// Topic that just lost its last subscriber.
    pub teardown_topic: Option<String>,
}

/// All live binding entries plus the topic registry.
#[derive(Debug, Default)]
pub struct BindingStateStore {
    entries: HashMap<String, BindingStateEntry>,
    registry: SubscriptionRegistry,
}

impl BindingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the entry for a control.
    pub fn subscribe(
        &mut self,
        control_id: &str,
        descriptor: &BindingDescriptor,
        options: &InstanceOptions,
        is_feedback: bool,
    ) -> SubscribeOutcome {
        let mut teardown_topic = self.unsubscribe(control_id);
        let entry = BindingStateEntry::new(control_id, descriptor, options, is_feedback);

        let mut register_topic = match &entry.topic {
            Some(topic) if self.registry.add(control_id, topic) => Some(topic.clone()),
            _ => None,
        };
        // Re-subscribing the only listener keeps the remote registration.
        if register_topic.is_some() && register_topic == teardown_topic {
            register_topic = None;
            teardown_topic = None;
        }

        let fetch = entry.fetch.clone();
        self.entries.insert(control_id.to_string(), entry);
        SubscribeOutcome {
            fetch,
            register_topic,
            teardown_topic,
        }
    }

    /// Apply new instance options. Returns the fetch that is now possible.
    ///
    /// A changed filter points at a different remote entity, so the cached
    /// value is dropped.
    pub fn reconfigure(
        &mut self,
        control_id: &str,
        descriptor: &BindingDescriptor,
        options: &InstanceOptions,
    ) -> Option<ValueFetch> {
        let entry = self.entries.get_mut(control_id)?;
        let rebuilt = BindingStateEntry::new(control_id, descriptor, options, entry.is_feedback);
        if rebuilt.filter != entry.filter {
            entry.cached = CachedValue::Unresolved;
        }
        entry.filter = rebuilt.filter;
        entry.options = rebuilt.options;
        entry.fetch = rebuilt.fetch;
        entry.fetch.clone()
    }

    /// Remove a control. Returns the topic to tear down, if it was the last
    /// subscriber.
    pub fn unsubscribe(&mut self, control_id: &str) -> Option<String> {
        self.entries.remove(control_id)?;
        self.registry.remove(control_id)
    }

    pub fn read(&self, control_id: &str) -> Option<CachedValue> {
        self.entries.get(control_id).map(|e| e.cached.clone())
    }

    pub fn entry(&self, control_id: &str) -> Option<&BindingStateEntry> {
        self.entries.get(control_id)
    }

    /// Store a value read from a response. Returns `false` for unknown
    /// controls.
    pub fn set_value(&mut self, control_id: &str, value: Value) -> bool {
        match self.entries.get_mut(control_id) {
            Some(entry) => {
                entry.cached = CachedValue::Value(value);
                true
            }
            None => false,
        }
    }

    /// Entries listening to a topic.
    pub fn subscribers_mut(&mut self, topic: &str) -> Vec<&mut BindingStateEntry> {
        let ids: HashSet<&str> = self.registry.subscribers(topic).collect();
        self.entries
            .values_mut()
            .filter(|e| ids.contains(e.control_id.as_str()))
            .collect()
    }

    /// Fetches of every live control whose options allow one.
    pub fn live_fetches(&self) -> Vec<ValueFetch> {
        let mut fetches: Vec<ValueFetch> =
            self.entries.values().filter_map(|e| e.fetch.clone()).collect();
        fetches.sort_by(|a, b| a.control_id.cmp(&b.control_id));
        fetches
    }

    /// Topics with at least one live subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.topics().map(str::to_string).collect();
        topics.sort();
        topics
    }

    pub fn topic_count(&self) -> usize {
        self.registry.topic_count()
    }

    /// Definitions with at least one live control.
    pub fn live_definitions(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|e| e.definition_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.registry.clear();
    }
}

/// A concrete option value: set, and not the unselected placeholder.
fn is_concrete(value: &Value) -> bool {
    !value.is_null() && !is_placeholder(value)
}

/// The GET request reading a control's tracked value, when every GET
/// parameter has a concrete value.
fn value_fetch(
    control_id: &str,
    descriptor: &BindingDescriptor,
    options: &InstanceOptions,
) -> Option<ValueFetch> {
    let tracked = descriptor.tracked_param()?;
    let get = descriptor.value_request.as_ref()?;

    let mut request = Request::new(&get.request_type);
    for param in &get.request_params {
        if param.kind == ParameterType::Const {
            if let Some(default) = &param.default_value {
                request.set(&param.id, default.clone());
            }
            continue;
        }
        let value = options.get(&param.id).filter(|v| is_concrete(v))?;
        request.set(&param.id, value.clone());
    }

    Some(ValueFetch {
        control_id: control_id.to_string(),
        tracked_param: tracked.to_string(),
        request,
    })
}
