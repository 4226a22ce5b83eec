//! Structured job logging.
//!
//! Every line carries the request id and the stage that produced it so a
//! single conversion can be followed through the log stream.

use tracing::{error, info, warn, Span};
use hls_models::JobId;

/// Logger bound to one job and one stage.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: String,
}

impl JobLogger {
    /// Create a logger for `job_id` at `stage` (e.g. "consume", "hls_conversion").
    pub fn new(job_id: &JobId, stage: &str) -> Self {
        Self::from_string(job_id.as_str(), stage)
    }

    pub fn from_string(job_id: &str, stage: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: stage.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.job_id,
            stage = %self.stage,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            request_id = %self.job_id,
            stage = %self.stage,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.job_id,
            stage = %self.stage,
            "Job warning: {}", message
        );
    }

    /// Log a failure. Transcoder diagnostics go in `detail` so they stay
    /// out of the headline.
    pub fn log_error(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => error!(
                request_id = %self.job_id,
                stage = %self.stage,
                detail = %detail,
                "Job error: {}", message
            ),
            None => error!(
                request_id = %self.job_id,
                stage = %self.stage,
                "Job error: {}", message
            ),
        }
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.job_id,
            stage = %self.stage,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Span covering the whole job, for nesting lower-level events.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", request_id = %self.job_id, stage = %self.stage)
    }
}
