//! Push notification routing.

use std::sync::Arc;

use studiolink_telemetry::MetricsRegistry;

use crate::protocol::Notification;
use crate::state::{BindingStateStore, CachedValue};

/// Applies push notifications to the binding entries they concern.
pub struct NotificationRouter {
    metrics: Arc<MetricsRegistry>,
}

impl NotificationRouter {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    /// Update every entry on the notification's topic whose filter matches
    /// and return the ids of the controls that changed, sorted.
    ///
    /// Filter values compare exactly; a notification without the tracked
    /// field updates nothing.
    pub fn dispatch(
        &self,
        store: &mut BindingStateStore,
        notification: &Notification,
    ) -> Vec<String> {
        let topic = notification.topic();
        let mut changed = Vec::new();

        for entry in store.subscribers_mut(topic) {
            if !entry.matches(notification) {
                continue;
            }
            let Some(tracked) = entry.tracked_param.as_deref() else {
                continue;
            };
            let Some(value) = notification.get(tracked) else {
                tracing::debug!(
                    topic,
                    control_id = %entry.control_id,
                    field = tracked,
                    "Notification lacks tracked field"
                );
                continue;
            };
            entry.cached = CachedValue::Value(value.clone());
            changed.push(entry.control_id.clone());
        }

        changed.sort();
        self.metrics.record_notification(topic, changed.len());
        tracing::trace!(topic, matched = changed.len(), "Notification routed");
        changed
    }
}
