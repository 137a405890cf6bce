//! Observability infrastructure for the datahub
//!
//! Provides:
//! - Prometheus metrics (query latency, errors by kind, returned volume)
//! - Structured logging of query lifecycle events with tracing
//!
//! Metrics live in a registry owned by [`DatahubMetrics`] rather than the
//! process-wide default registry, so every instance is independent.

use crate::error::DatahubError;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::{info, warn};

/// Histogram buckets for upstream query latency (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Datahub metrics for Prometheus exposition
///
/// Clones share the same underlying metrics and registry.
#[derive(Clone)]
pub struct DatahubMetrics {
    registry: Registry,
    query_duration_seconds: HistogramVec,
    query_errors_total: IntCounterVec,
    samples_returned_total: IntCounterVec,
    entities_returned: IntGaugeVec,
}

impl DatahubMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "datahub_query_duration_seconds",
                "Time spent serving one list or create operation",
            )
            .buckets(QUERY_LATENCY_BUCKETS.to_vec()),
            &["operation"],
        )?;
        let query_errors_total = IntCounterVec::new(
            Opts::new("datahub_query_errors_total", "Failed operations by error kind"),
            &["operation", "kind"],
        )?;
        let samples_returned_total = IntCounterVec::new(
            Opts::new(
                "datahub_samples_returned_total",
                "Samples returned to callers after shaping",
            ),
            &["operation"],
        )?;
        let entities_returned = IntGaugeVec::new(
            Opts::new(
                "datahub_entities_returned",
                "Entities in the most recent result of an operation",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(query_duration_seconds.clone()))?;
        registry.register(Box::new(query_errors_total.clone()))?;
        registry.register(Box::new(samples_returned_total.clone()))?;
        registry.register(Box::new(entities_returned.clone()))?;

        Ok(Self {
            registry,
            query_duration_seconds,
            query_errors_total,
            samples_returned_total,
            entities_returned,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_query_duration(&self, operation: &str, duration_secs: f64) {
        self.query_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn inc_query_error(&self, operation: &str, err: &DatahubError) {
        self.query_errors_total
            .with_label_values(&[operation, err.kind()])
            .inc();
    }

    /// Record the volume of a successful result
    pub fn record_result(&self, operation: &str, entities: usize, samples: usize) {
        self.entities_returned
            .with_label_values(&[operation])
            .set(entities as i64);
        self.samples_returned_total
            .with_label_values(&[operation])
            .inc_by(samples as u64);
    }

    /// Render every metric in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for datahub events
///
/// Each component gets its own handle so log records carry the component
/// that emitted them.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Handle for a sub-component, e.g. `dao.metrics`
    pub fn child(&self, name: &str) -> Self {
        Self::new(format!("{}.{}", self.component, name))
    }

    pub fn log_query_started(&self, operation: &str, targets: usize) {
        info!(
            event = "query_started",
            component = %self.component,
            operation = %operation,
            targets = targets,
            "Fanning out query"
        );
    }

    pub fn log_query_completed(
        &self,
        operation: &str,
        entities: usize,
        samples: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "query_completed",
            component = %self.component,
            operation = %operation,
            entities = entities,
            samples = samples,
            elapsed_ms = elapsed_ms as u64,
            "Query completed"
        );
    }

    pub fn log_query_failed(&self, operation: &str, err: &DatahubError) {
        if err.is_query_condition_exceeds_maximum() {
            info!(
                event = "query_rejected",
                component = %self.component,
                operation = %operation,
                kind = err.kind(),
                error = %err,
                "Query condition exceeds backend resolution"
            );
        } else {
            warn!(
                event = "query_failed",
                component = %self.component,
                operation = %operation,
                kind = err.kind(),
                error = %err,
                "Query failed"
            );
        }
    }

    pub fn log_points_written(&self, operation: &str, database: &str, points: usize) {
        info!(
            event = "points_written",
            component = %self.component,
            operation = %operation,
            database = %database,
            points = points,
            "Wrote points to time-series store"
        );
    }

    pub fn log_startup(&self, version: &str, api_port: u16) {
        info!(
            event = "datahub_started",
            component = %self.component,
            version = %version,
            api_port = api_port,
            "Datahub started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "datahub_shutdown",
            component = %self.component,
            reason = %reason,
            "Datahub shutting down"
        );
    }
}
