//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{Disposition, WorkerError, WorkerResult};

/// Install the global recorder and serve `/metrics` on `port`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_RECEIVED_TOTAL: &str = "hls_messages_received_total";
    pub const MESSAGES_COMMITTED_TOTAL: &str = "hls_messages_committed_total";
    pub const MESSAGES_WITHHELD_TOTAL: &str = "hls_messages_withheld_total";
    pub const FETCH_ERRORS_TOTAL: &str = "hls_fetch_errors_total";

    pub const JOBS_TOTAL: &str = "hls_jobs_total";
    pub const TRANSCODE_DURATION_SECONDS: &str = "hls_transcode_duration_seconds";

    pub const COMPLETION_PUBLISH_FAILURES_TOTAL: &str = "hls_completion_publish_failures_total";
}

pub fn record_message_received() {
    counter!(names::MESSAGES_RECEIVED_TOTAL).increment(1);
}

/// Record the final disposition of a message. `reason` is "ok" or an error kind.
pub fn record_disposition(disposition: Disposition, reason: &str) {
    let labels = [("reason", reason.to_string())];
    match disposition {
        Disposition::Commit => counter!(names::MESSAGES_COMMITTED_TOTAL, &labels).increment(1),
        Disposition::Withhold => counter!(names::MESSAGES_WITHHELD_TOTAL, &labels).increment(1),
    }
}

pub fn record_fetch_error() {
    counter!(names::FETCH_ERRORS_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

pub fn record_transcode_duration(duration_secs: f64) {
    histogram!(names::TRANSCODE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_publish_failure() {
    counter!(names::COMPLETION_PUBLISH_FAILURES_TOTAL).increment(1);
}
