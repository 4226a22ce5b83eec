//! Inbound job request payload.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{ModelError, ModelResult};
use crate::job::JobId;

/// Message payload asking for one file to be converted.
///
/// Wire format: `{"requestId": "...", "filePath": "...", "outputPath"?: "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Correlation identifier echoed in the completion event
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "requestId is required"))]
    pub request_id: String,

    /// Input media file on the worker's filesystem
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "filePath is required"))]
    pub file_path: String,

    /// Overrides the per-job output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

impl JobRequest {
    pub fn new(request_id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            file_path: file_path.into(),
            output_path: None,
        }
    }

    /// Decode and validate a raw message payload.
    ///
    /// Both failure modes are permanent: the payload will never become valid
    /// on redelivery.
    pub fn decode(payload: &[u8]) -> ModelResult<Self> {
        let request: JobRequest = serde_json::from_slice(payload)?;
        request.validate().map_err(|errors| {
            let mut fields: Vec<String> = errors
                .field_errors()
                .into_iter()
                .flat_map(|(_, errs)| errs.iter())
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            fields.sort();
            ModelError::invalid_request(format!(
                "invalid message format: {}",
                fields.join(", ")
            ))
        })?;
        Ok(request)
    }

    pub fn job_id(&self) -> JobId {
        JobId::from_string(self.request_id.clone())
    }

    pub fn input_path(&self) -> PathBuf {
        PathBuf::from(&self.file_path)
    }
}
