//! HLS conversion worker.
//!
//! This crate provides:
//! - The consume loop: fetch a job request, convert, publish, commit
//! - The commit/withhold policy for failed messages
//! - Structured job logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod job_manager;
pub mod logging;
pub mod metrics;
pub mod publisher;

pub use config::WorkerConfig;
pub use error::{Disposition, WorkerError, WorkerResult};
pub use executor::{JobExecutor, PollOutcome};
pub use job_manager::JobManager;
pub use logging::JobLogger;
pub use publisher::{CompletionPublisher, PublishOutcome};
