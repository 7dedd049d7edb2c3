//! Reference-counted notification topic registry.

use std::collections::{HashMap, HashSet};

/// Which controls listen to which topic.
///
/// A topic is registered with the studio when its first control arrives
/// and torn down when its last control leaves.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_topic: HashMap<String, HashSet<String>>,
    by_control: HashMap<String, String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a control to a topic. Returns `true` when the topic had no
    /// subscribers before, i.e. it must be registered remotely.
    ///
    /// A control listens to at most one topic; callers remove it from the
    /// previous one first.
    pub fn add(&mut self, control_id: &str, topic: &str) -> bool {
        if let Some(existing) = self.by_control.get(control_id) {
            if existing == topic {
                return false;
            }
            tracing::debug!(control_id, from = %existing, to = topic, "Control moved between topics");
            self.remove(control_id);
        }
        self.by_control
            .insert(control_id.to_string(), topic.to_string());
        let subscribers = self.by_topic.entry(topic.to_string()).or_default();
        subscribers.insert(control_id.to_string());
        subscribers.len() == 1
    }

    /// Remove a control. Returns the topic when it lost its last subscriber.
    pub fn remove(&mut self, control_id: &str) -> Option<String> {
        let topic = self.by_control.remove(control_id)?;
        let subscribers = self.by_topic.get_mut(&topic)?;
        subscribers.remove(control_id);
        if subscribers.is_empty() {
            self.by_topic.remove(&topic);
            Some(topic)
        } else {
            None
        }
    }

    pub fn subscribers(&self, topic: &str) -> impl Iterator<Item = &str> {
        self.by_topic
            .get(topic)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.by_topic.get(topic).map_or(0, HashSet::len)
    }

    pub fn topic_of(&self, control_id: &str) -> Option<&str> {
        self.by_control.get(control_id).map(String::as_str)
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }

    pub fn topic_count(&self) -> usize {
        self.by_topic.len()
    }

    pub fn clear(&mut self) {
        self.by_topic.clear();
        self.by_control.clear();
    }
}
