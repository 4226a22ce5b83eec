//! Outbound completion event.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::job::{ConversionJob, JobStatus};

/// Terminal outcome carried by a completion event.
///
/// There is no `processing` variant, so a non-terminal job can never be
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Failed => "failed",
        }
    }
}

/// Event emitted once a job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub request_id: String,
    pub status: CompletionStatus,
    pub input_file: String,
    pub output_file: String,
    /// Present iff `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionEvent {
    /// Build an event from a terminal job.
    pub fn from_job(job: &ConversionJob) -> ModelResult<Self> {
        let status = match job.status {
            JobStatus::Completed => CompletionStatus::Completed,
            JobStatus::Failed => CompletionStatus::Failed,
            JobStatus::Pending | JobStatus::Processing => {
                return Err(ModelError::NotTerminal(job.id.to_string()));
            }
        };

        let error_message = match status {
            CompletionStatus::Failed => Some(
                job.error
                    .clone()
                    .unwrap_or_else(|| "conversion failed".to_string()),
            ),
            CompletionStatus::Completed => None,
        };

        Ok(Self {
            request_id: job.id.to_string(),
            status,
            input_file: job.input_file.to_string_lossy().into_owned(),
            output_file: job
                .output_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            error_message,
            completed_at: job.completed_at.unwrap_or_else(Utc::now),
        })
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
