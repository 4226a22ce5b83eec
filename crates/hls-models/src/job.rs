//! Conversion job and its status machine.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Caller-supplied correlation identifier (the request id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// Transitions only move forward: `pending -> processing -> {completed | failed}`.
/// A pending job may also fail directly when it is rejected before the
/// transcoder runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of conversion work.
///
/// Jobs live only in memory for the duration of a single message; nothing
/// is persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConversionJob {
    pub id: JobId,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Manifest path; resolved before the transcoder runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionJob {
    /// Create a new pending job.
    pub fn new(
        id: JobId,
        input_file: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            id,
            input_file: input_file.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            output_file: None,
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move the job into `processing`.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Processing)
    }

    /// Record the manifest path. Rejected once the job is terminal.
    pub fn set_output_file(&mut self, path: impl Into<PathBuf>) -> ModelResult<()> {
        if self.is_terminal() {
            return Err(ModelError::IllegalTransition {
                from: self.status,
                to: self.status,
            });
        }
        self.output_file = Some(path.into());
        Ok(())
    }

    /// Mark job as completed.
    pub fn complete(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark job as failed with diagnostic text.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
