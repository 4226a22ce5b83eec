//! Message queue capability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::message::QueueMessage;

/// At-least-once consumer with manual commit plus a keyed producer.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Wait at most `wait` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    async fn fetch_next(&self, wait: Duration) -> QueueResult<Option<QueueMessage>>;

    /// Advance the durable offset past `message`.
    ///
    /// Only call this once the outcome is known. A message that is never
    /// committed stays pending and is redelivered.
    async fn commit(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Whether an output topic is configured.
    fn has_output(&self) -> bool;

    /// Send `payload` to the output topic, keyed for per-key ordering.
    async fn publish(&self, key: &str, payload: &[u8]) -> QueueResult<()>;

    /// Release consumer and producer resources. Idempotent.
    async fn close(&self) -> QueueResult<()>;
}
