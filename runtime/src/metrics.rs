//! Prometheus metrics for the plan pipeline.
//!
//! - Operations: count and latency per request operation and outcome
//! - Events: published, failed publishes, consumer dispositions
//!
//! # Example
//!
//! ```rust,no_run
//! use plan_registry_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let _text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use plan_registry_core::error::Operation;
use plan_registry_core::event::PlanEventKind;
use plan_registry_core::event_bus::Disposition;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Operations processed, by `operation` and `outcome`.
pub const OPERATIONS_TOTAL: &str = "plan_registry_operations_total";
/// Operation latency, by `operation`.
pub const OPERATION_DURATION: &str = "plan_registry_operation_duration_seconds";
/// Events handed to the queue, by `kind`.
pub const EVENTS_PUBLISHED_TOTAL: &str = "plan_registry_events_published_total";
/// Publishes that failed and were dropped.
pub const PUBLISH_FAILURES_TOTAL: &str = "plan_registry_publish_failures_total";
/// Consumed messages, by `disposition`.
pub const CONSUMER_MESSAGES_TOTAL: &str = "plan_registry_consumer_messages_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe the registry's metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or a
    /// different recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Plan operations processed, by operation and outcome");
    describe_histogram!(OPERATION_DURATION, "Time taken by plan operations");
    describe_counter!(EVENTS_PUBLISHED_TOTAL, "Change events handed to the queue");
    describe_counter!(PUBLISH_FAILURES_TOTAL, "Change events dropped after a publish failure");
    describe_counter!(CONSUMER_MESSAGES_TOTAL, "Consumed messages, by disposition");
}

/// Pipeline metrics recorder.
pub struct PlanMetrics;

impl PlanMetrics {
    /// Record a finished operation.
    pub fn record_operation(operation: Operation, outcome: &'static str, duration: Duration) {
        counter!(OPERATIONS_TOTAL, "operation" => operation.as_str(), "outcome" => outcome)
            .increment(1);
        histogram!(OPERATION_DURATION, "operation" => operation.as_str())
            .record(duration.as_secs_f64());
    }

    /// Record a published event.
    pub fn record_published(kind: PlanEventKind) {
        counter!(EVENTS_PUBLISHED_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    /// Record a dropped event.
    pub fn record_publish_failure() {
        counter!(PUBLISH_FAILURES_TOTAL).increment(1);
    }

    /// Record a consumed message.
    pub fn record_consumed(disposition: Disposition) {
        counter!(CONSUMER_MESSAGES_TOTAL, "disposition" => disposition.as_str()).increment(1);
    }
}
