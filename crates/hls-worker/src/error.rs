//! Worker error types and commit policy.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// What to do with the source message once processing stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Advance the offset; the message will not be seen again.
    Commit,
    /// Leave the message pending so it is redelivered.
    Withhold,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Unsupported input format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    /// `permanent` is set when retrying cannot help: the directory came
    /// from the request, or the filesystem rejected the path itself.
    #[error("Cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        permanent: bool,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Model error: {0}")]
    Model(#[from] hls_models::ModelError),

    #[error("Queue error: {0}")]
    Queue(#[from] hls_queue::QueueError),
}

impl WorkerError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn conversion_failed(msg: impl Into<String>) -> Self {
        Self::ConversionFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Decide whether the source message should be committed.
    ///
    /// Anything tied to the message content is permanent and gets committed.
    /// Transient storage trouble under the output root and transient broker
    /// failures are withheld so the message is redelivered once the
    /// environment recovers.
    pub fn disposition(&self) -> Disposition {
        match self {
            WorkerError::Malformed(_)
            | WorkerError::InvalidRequest(_)
            | WorkerError::InputNotFound(_)
            | WorkerError::UnsupportedFormat(_)
            | WorkerError::ConversionFailed(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Model(_) => Disposition::Commit,
            WorkerError::OutputDir { permanent: true, .. } => Disposition::Commit,
            WorkerError::OutputDir { permanent: false, .. } => Disposition::Withhold,
            WorkerError::Queue(e) if e.is_transient() => Disposition::Withhold,
            WorkerError::Queue(_) => Disposition::Commit,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Malformed(_) => "malformed",
            WorkerError::InvalidRequest(_) => "invalid_request",
            WorkerError::InputNotFound(_) => "input_not_found",
            WorkerError::UnsupportedFormat(_) => "unsupported_format",
            WorkerError::ConversionFailed(_) => "conversion_failed",
            WorkerError::OutputDir { .. } => "output_dir",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Model(_) => "model",
            WorkerError::Queue(_) => "queue",
        }
    }
}
