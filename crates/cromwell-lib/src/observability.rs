//! Observability infrastructure for the Cromwell tools
//!
//! Provides Prometheus metrics for monitoring-log ingestion and REST calls.
//! Logging itself goes through `tracing`; the subscriber is installed by the
//! binary.

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, Encoder, Histogram,
    HistogramVec, IntCounter, TextEncoder,
};
use std::sync::OnceLock;

/// Histogram buckets for network latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ToolMetricsInner> = OnceLock::new();

struct ToolMetricsInner {
    logs_parsed: IntCounter,
    samples_parsed: IntCounter,
    parse_failures: IntCounter,
    tasks_aggregated: IntCounter,
    task_failures: IntCounter,
    fetch_latency_seconds: Histogram,
    request_latency_seconds: HistogramVec,
}

impl ToolMetricsInner {
    fn new() -> Self {
        Self {
            logs_parsed: register_int_counter!(
                "cromwell_tools_logs_parsed_total",
                "Monitoring logs parsed"
            )
            .expect("Failed to register logs_parsed"),

            samples_parsed: register_int_counter!(
                "cromwell_tools_samples_parsed_total",
                "Utilization samples produced by the log parsers"
            )
            .expect("Failed to register samples_parsed"),

            parse_failures: register_int_counter!(
                "cromwell_tools_parse_failures_total",
                "Monitoring logs or blocks that failed to parse"
            )
            .expect("Failed to register parse_failures"),

            tasks_aggregated: register_int_counter!(
                "cromwell_tools_tasks_aggregated_total",
                "Tasks merged into a single utilization record"
            )
            .expect("Failed to register tasks_aggregated"),

            task_failures: register_int_counter!(
                "cromwell_tools_task_failures_total",
                "Tasks whose utilization could not be determined"
            )
            .expect("Failed to register task_failures"),

            fetch_latency_seconds: register_histogram!(
                "cromwell_tools_fetch_latency_seconds",
                "Time spent downloading monitoring logs",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            request_latency_seconds: register_histogram_vec!(
                "cromwell_tools_request_latency_seconds",
                "Time spent in Cromwell REST requests",
                &["endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_latency_seconds"),
        }
    }
}

/// Lightweight handle to the global metrics instance.
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Copy)]
pub struct ToolMetrics {
    _private: (),
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ToolMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ToolMetricsInner {
        GLOBAL_METRICS.get_or_init(ToolMetricsInner::new)
    }

    pub fn inc_logs_parsed(&self) {
        self.inner().logs_parsed.inc();
    }

    pub fn add_samples_parsed(&self, count: u64) {
        self.inner().samples_parsed.inc_by(count);
    }

    pub fn inc_parse_failures(&self) {
        self.inner().parse_failures.inc();
    }

    pub fn inc_tasks_aggregated(&self) {
        self.inner().tasks_aggregated.inc();
    }

    pub fn inc_task_failures(&self) {
        self.inner().task_failures.inc();
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn observe_request_latency(&self, endpoint: &str, duration_secs: f64) {
        self.inner()
            .request_latency_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
