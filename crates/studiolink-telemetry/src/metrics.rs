//! Prometheus metrics registry for the binding engine.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Request outcome labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub request_type: String,
    pub outcome: String,
}

/// Notification labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NotificationLabels {
    pub topic: String,
}

/// Metrics registry holding all studiolink metrics.
pub struct MetricsRegistry {
    /// The prometheus-client registry for encoding.
    pub registry: Registry,

    // Request metrics
    pub requests_total: Family<RequestLabels, Counter>,
    pub requests_in_flight: Gauge,

    // Notification metrics
    pub notifications_total: Family<NotificationLabels, Counter>,
    pub notification_matches_total: Family<NotificationLabels, Counter>,

    // Connection metrics
    pub connection_open: Gauge,
    pub connect_attempts_total: Counter,
    pub reconnects_total: Counter,

    // Binding metrics
    pub active_topics: Gauge,
    pub refreshes_total: Counter,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "studiolink_requests_total",
            "Total number of correlated requests by outcome",
            requests_total.clone(),
        );

        let requests_in_flight = Gauge::default();
        registry.register(
            "studiolink_requests_in_flight",
            "Number of requests awaiting a response",
            requests_in_flight.clone(),
        );

        let notifications_total = Family::<NotificationLabels, Counter>::default();
        registry.register(
            "studiolink_notifications_total",
            "Total number of push notifications received",
            notifications_total.clone(),
        );

        let notification_matches_total = Family::<NotificationLabels, Counter>::default();
        registry.register(
            "studiolink_notification_matches_total",
            "Total number of bindings updated by push notifications",
            notification_matches_total.clone(),
        );

        let connection_open = Gauge::default();
        registry.register(
            "studiolink_connection_open",
            "1 while the studio connection is open",
            connection_open.clone(),
        );

        let connect_attempts_total = Counter::default();
        registry.register(
            "studiolink_connect_attempts_total",
            "Total number of connection attempts",
            connect_attempts_total.clone(),
        );

        let reconnects_total = Counter::default();
        registry.register(
            "studiolink_reconnects_total",
            "Total number of scheduled reconnects",
            reconnects_total.clone(),
        );

        let active_topics = Gauge::default();
        registry.register(
            "studiolink_active_topics",
            "Number of notification topics registered with the studio",
            active_topics.clone(),
        );

        let refreshes_total = Counter::default();
        registry.register(
            "studiolink_refreshes_total",
            "Total number of consolidated binding refreshes",
            refreshes_total.clone(),
        );

        Self {
            registry,
            requests_total,
            requests_in_flight,
            notifications_total,
            notification_matches_total,
            connection_open,
            connect_attempts_total,
            reconnects_total,
            active_topics,
            refreshes_total,
        }
    }

    /// Record a finished request.
    pub fn record_request(&self, request_type: &str, outcome: &str) {
        let labels = RequestLabels {
            request_type: request_type.to_string(),
            outcome: outcome.to_string(),
        };
        self.requests_total.get_or_create(&labels).inc();
    }

    /// Record a routed notification and how many bindings it updated.
    pub fn record_notification(&self, topic: &str, matched: usize) {
        let labels = NotificationLabels {
            topic: topic.to_string(),
        };
        self.notifications_total.get_or_create(&labels).inc();
        if matched > 0 {
            self.notification_matches_total
                .get_or_create(&labels)
                .inc_by(matched as u64);
        }
    }

    pub fn connection_opened(&self) {
        self.connection_open.set(1);
    }

    pub fn connection_closed(&self) {
        self.connection_open.set(0);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.requests_in_flight.get(), 0);
        assert_eq!(registry.connection_open.get(), 0);
    }

    #[test]
    fn test_record_request() {
        let registry = MetricsRegistry::new();
        registry.record_request("SetProgramMuted", "ok");
        registry.record_request("SetProgramMuted", "ok");
        registry.record_request("SetProgramMuted", "rejected");

        let labels = RequestLabels {
            request_type: "SetProgramMuted".to_string(),
            outcome: "ok".to_string(),
        };
        assert_eq!(registry.requests_total.get_or_create(&labels).get(), 2);
    }

    #[test]
    fn test_record_notification() {
        let registry = MetricsRegistry::new();
        registry.record_notification("audiomixer.output.muted", 0);
        registry.record_notification("audiomixer.output.muted", 2);

        let labels = NotificationLabels {
            topic: "audiomixer.output.muted".to_string(),
        };
        assert_eq!(registry.notifications_total.get_or_create(&labels).get(), 2);
        assert_eq!(
            registry.notification_matches_total.get_or_create(&labels).get(),
            2
        );
    }

    #[test]
    fn test_connection_tracking() {
        let registry = MetricsRegistry::new();
        registry.connection_opened();
        assert_eq!(registry.connection_open.get(), 1);
        registry.connection_closed();
        assert_eq!(registry.connection_open.get(), 0);
    }
}
