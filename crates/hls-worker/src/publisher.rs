//! Completion event publishing.

use std::sync::Arc;

use hls_models::{CompletionEvent, ConversionJob};
use hls_queue::MessageQueue;
use tracing::{debug, warn};

use crate::metrics;

/// Outcome of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// No output topic configured.
    Skipped,
    /// Encoding or broker failure; logged and counted.
    Failed,
}

/// Emits one event per terminal job, keyed by request id.
///
/// Failures never affect the commit decision for the source message.
pub struct CompletionPublisher {
    queue: Arc<dyn MessageQueue>,
}

impl CompletionPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    pub async fn publish(&self, job: &ConversionJob) -> PublishOutcome {
        if !self.queue.has_output() {
            debug!(request_id = %job.id, "No output topic, skipping completion event");
            return PublishOutcome::Skipped;
        }

        let payload = match CompletionEvent::from_job(job).and_then(|event| event.to_json()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(request_id = %job.id, "Failed to encode completion event: {}", e);
                metrics::record_publish_failure();
                return PublishOutcome::Failed;
            }
        };

        match self.queue.publish(job.id.as_str(), &payload).await {
            Ok(()) => {
                debug!(request_id = %job.id, status = job.status.as_str(), "Completion event published");
                PublishOutcome::Sent
            }
            Err(e) => {
                warn!(request_id = %job.id, "Failed to publish completion event: {}", e);
                metrics::record_publish_failure();
                PublishOutcome::Failed
            }
        }
    }
}
