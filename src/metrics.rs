//! Operator metrics
//!
//! Prometheus collectors for orchestrator operations, probe failures and
//! catalog write failures. The [`Metrics`] value owns its own registry so
//! tests and multiple orchestrators never collide on global registration.

use crate::error::{Error, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Collectors shared by the orchestrator and the metrics endpoint
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
    operation_duration: HistogramVec,
    probe_failures: IntCounterVec,
    persistence_failures: IntCounter,
}

impl Metrics {
    /// Create and register all collectors
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "storage_operations_total",
                "Storage operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metrics_error)?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "storage_operation_duration_seconds",
                "Duration of storage operations",
            ),
            &["operation"],
        )
        .map_err(metrics_error)?;

        let probe_failures = IntCounterVec::new(
            Opts::new(
                "storage_probe_failures_total",
                "Status probe failures tolerated during refresh",
            ),
            &["probe"],
        )
        .map_err(metrics_error)?;

        let persistence_failures = IntCounter::new(
            "storage_catalog_write_failures_total",
            "Catalog writes that failed during a refresh",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(operation_duration.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(probe_failures.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(persistence_failures.clone()))
            .map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            operations,
            operation_duration,
            probe_failures,
            persistence_failures,
        }))
    }

    /// Record a finished operation
    pub fn observe_operation(&self, operation: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "error" };
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_probe_failure(&self, probe: &str) {
        self.probe_failures.with_label_values(&[probe]).inc();
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    /// Count of operations with the given outcome
    pub fn operation_count(&self, operation: &str, success: bool) -> u64 {
        let outcome = if success { "success" } else { "error" };
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn probe_failure_count(&self, probe: &str) -> u64 {
        self.probe_failures.with_label_values(&[probe]).get()
    }

    pub fn persistence_failure_count(&self) -> u64 {
        self.persistence_failures.get()
    }

    /// Render all collectors in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_operation("create", true, Duration::from_millis(5));
        metrics.observe_operation("create", false, Duration::from_millis(5));
        metrics.observe_operation("create", true, Duration::from_millis(5));
        metrics.record_probe_failure("workload");
        metrics.record_persistence_failure();

        assert_eq!(metrics.operation_count("create", true), 2);
        assert_eq!(metrics.operation_count("create", false), 1);
        assert_eq!(metrics.probe_failure_count("workload"), 1);
        assert_eq!(metrics.probe_failure_count("volume_claim"), 0);
        assert_eq!(metrics.persistence_failure_count(), 1);
    }

    #[test]
    fn test_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_operation("list", true, Duration::from_millis(1));

        let (content_type, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("storage_operations_total"));
        assert!(text.contains("operation=\"list\""));
    }
}
