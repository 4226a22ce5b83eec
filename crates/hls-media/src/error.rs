//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving the external transcoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Transcoder not found: {0}")]
    TranscoderNotFound(String),

    #[error("Failed to launch transcoder: {0}")]
    LaunchFailed(#[source] std::io::Error),

    /// Non-zero exit. `output` is combined stdout and stderr.
    #[error("Transcoder exited with {status}: {output}")]
    TranscodeFailed {
        status: String,
        output: String,
        exit_code: Option<i32>,
    },

    #[error("Invalid naming scheme: {0}")]
    InvalidNamingScheme(String),
}

impl MediaError {
    /// Create a transcode failure error.
    pub fn transcode_failed(
        status: impl Into<String>,
        output: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TranscodeFailed {
            status: status.into(),
            output: output.into(),
            exit_code,
        }
    }

    /// Diagnostic text captured from the process, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::TranscodeFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
