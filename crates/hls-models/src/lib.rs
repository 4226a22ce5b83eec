//! Shared data models for the HLS conversion worker.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion jobs and their status machine
//! - Inbound job request payloads
//! - Outbound completion events

pub mod error;
pub mod event;
pub mod job;
pub mod request;

pub use error::{ModelError, ModelResult};
pub use event::{CompletionEvent, CompletionStatus};
pub use job::{ConversionJob, JobId, JobStatus};
pub use request::JobRequest;
