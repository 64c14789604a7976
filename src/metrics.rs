//! Metrics for connection construction and deprecation detection.
//!
//! Provides Prometheus counters; nothing is exported unless the host
//! encodes the registry.

use prometheus::{IntCounterVec, Opts, Registry};

/// Metrics collector for the convention layer.
#[derive(Clone)]
pub struct ConventionMetrics {
    /// Registry for all metrics
    registry: Registry,

    /// Counter for successfully constructed connections
    pub connections_created_total: IntCounterVec,

    /// Counter for rejected connection constructions
    pub connection_errors_total: IntCounterVec,

    /// Counter for responses carrying a valid Sunset header
    pub sunset_responses_total: IntCounterVec,
}

impl ConventionMetrics {
    /// Create a new metrics collector with the given prefix.
    pub fn new(prefix: &str) -> Self {
        let registry = Registry::new();

        let connections_created_total = IntCounterVec::new(
            Opts::new(
                format!("{}_connections_created_total", prefix),
                "Total number of connections constructed",
            ),
            &["environment"],
        )
        .expect("Failed to create connections_created_total metric");

        let connection_errors_total = IntCounterVec::new(
            Opts::new(
                format!("{}_connection_errors_total", prefix),
                "Total number of rejected connection constructions",
            ),
            &["reason"],
        )
        .expect("Failed to create connection_errors_total metric");

        let sunset_responses_total = IntCounterVec::new(
            Opts::new(
                format!("{}_sunset_responses_total", prefix),
                "Total number of responses announcing a sunset date",
            ),
            &["host"],
        )
        .expect("Failed to create sunset_responses_total metric");

        registry
            .register(Box::new(connections_created_total.clone()))
            .expect("Failed to register connections_created_total");
        registry
            .register(Box::new(connection_errors_total.clone()))
            .expect("Failed to register connection_errors_total");
        registry
            .register(Box::new(sunset_responses_total.clone()))
            .expect("Failed to register sunset_responses_total");

        Self {
            registry,
            connections_created_total,
            connection_errors_total,
            sunset_responses_total,
        }
    }

    /// Record a constructed connection.
    pub fn record_connection(&self, environment: &str) {
        self.connections_created_total
            .with_label_values(&[environment])
            .inc();
    }

    /// Record a rejected construction.
    pub fn record_connection_error(&self, reason: &str) {
        self.connection_errors_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a response that carried a Sunset header.
    pub fn record_sunset(&self, host: &str) {
        self.sunset_responses_total.with_label_values(&[host]).inc();
    }

    /// Get the Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ConventionMetrics {
    fn default() -> Self {
        Self::new("service_conventions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ConventionMetrics::new("test");
        metrics.record_connection("test");
        assert!(!metrics.encode().is_empty());
    }

    #[test]
    fn test_record_connection_error() {
        let metrics = ConventionMetrics::new("test");
        metrics.record_connection_error("missing_app");
        metrics.record_connection_error("missing_app");

        let output = metrics.encode();
        assert!(output.contains("test_connection_errors_total"));
        assert!(output.contains("reason=\"missing_app\"} 2"));
    }

    #[test]
    fn test_record_sunset() {
        let metrics = ConventionMetrics::new("test");
        metrics.record_sunset("foo.com");

        let output = metrics.encode();
        assert!(output.contains("test_sunset_responses_total"));
        assert!(output.contains("foo.com"));
    }
}
