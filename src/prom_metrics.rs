//! # Prometheus Metrics
//!
//! Exposes precastflow operational metrics in the Prometheus text exposition
//! format on `GET /metrics`.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `precastflow_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `precastflow_transitions_total` | Counter | `outcome` | Progression requests by outcome |
//! | `precastflow_notifications_total` | Counter | `result` | Notification deliveries by result |
//!
//! Paths are normalised (`/activities/:id/status`) before labelling so the
//! histogram does not grow one series per activity.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ResultLabel {
    pub result: String,
}

/// Thread-safe metrics registry.
///
/// All fields use atomic types and are safe to update from any task. `Family`
/// creates per-label-set instances on first use.
pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: Family<HttpLabel, Histogram>,
    pub transitions: Family<OutcomeLabel, Counter>,
    pub notifications: Family<ResultLabel, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration = Family::<HttpLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 12))
        });
        registry.register(
            "precastflow_http_request_duration_seconds",
            "HTTP request latency by method and normalised path",
            http_request_duration.clone(),
        );

        let transitions = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "precastflow_transitions",
            "Progression requests by outcome",
            transitions.clone(),
        );

        let notifications = Family::<ResultLabel, Counter>::default();
        registry.register(
            "precastflow_notifications",
            "Notification deliveries by result",
            notifications.clone(),
        );

        Self {
            registry,
            http_request_duration,
            transitions,
            notifications,
        }
    }

    /// Count one progression request. `outcome` is one of `advanced`, `terminal`,
    /// `waiting`, `noop`, `rejected`, `failed`.
    pub fn record_transition(&self, outcome: &str) {
        self.transitions
            .get_or_create(&OutcomeLabel {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Count one notification. `result` is one of `delivered`, `failed`, `dropped`.
    pub fn record_notification(&self, result: &str) {
        self.notifications
            .get_or_create(&ResultLabel {
                result: result.to_string(),
            })
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
