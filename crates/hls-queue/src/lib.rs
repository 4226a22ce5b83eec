//! Job channel for the HLS conversion worker.
//!
//! This crate provides:
//! - The `MessageQueue` capability: bounded fetch, manual commit, keyed publish
//! - A Redis Streams implementation using consumer groups and `XACK`
//! - Reclaiming of idle pending entries for redelivery
//! - An in-memory queue for tests (feature `testing`)

pub mod config;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod message;
pub mod queue;
pub mod redis_stream;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryQueue;
pub use message::QueueMessage;
pub use queue::MessageQueue;
pub use redis_stream::RedisStreamQueue;
