//! Queue error types.

use std::time::Duration;

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Fetch did not return within {0:?}")]
    FetchTimeout(Duration),

    #[error("No output topic configured")]
    NoOutputTopic,

    #[error("Queue client is closed")]
    Closed,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Check if the error is an infrastructure hiccup worth waiting out.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) | QueueError::FetchTimeout(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            QueueError::NoOutputTopic | QueueError::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(QueueError::connection_failed("refused").is_transient());
        assert!(QueueError::FetchTimeout(Duration::from_secs(10)).is_transient());
        assert!(!QueueError::Closed.is_transient());
        assert!(!QueueError::NoOutputTopic.is_transient());
    }

    #[test]
    fn test_io_redis_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = QueueError::Redis(redis::RedisError::from(io));
        assert!(err.is_transient());
    }
}
