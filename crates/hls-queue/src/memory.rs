//! In-memory job channel.
//!
//! Messages are served in push order. Commits and published events are
//! recorded so tests can assert on them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::queue::MessageQueue;

enum Scripted {
    Message(QueueMessage),
    Error(String),
}

#[derive(Default)]
struct State {
    inbox: VecDeque<Scripted>,
    committed: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    fail_publish: bool,
    next_id: u64,
    close_calls: u32,
}

/// Queue that lives entirely in process memory.
pub struct InMemoryQueue {
    topic: String,
    output: bool,
    state: Mutex<State>,
}

impl InMemoryQueue {
    /// Queue with an output topic.
    pub fn new() -> Self {
        Self::with_output(true)
    }

    /// Queue with or without an output topic.
    pub fn with_output(output: bool) -> Self {
        Self {
            topic: "memory:jobs".to_string(),
            output,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a payload; returns its message id.
    pub fn push(&self, payload: impl Into<Vec<u8>>) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        let message = QueueMessage::new(id.clone(), self.topic.clone(), payload);
        state.inbox.push_back(Scripted::Message(message));
        id
    }

    /// Make the next fetch fail with a transient connection error.
    pub fn push_fetch_error(&self, reason: impl Into<String>) {
        self.state().inbox.push_back(Scripted::Error(reason.into()));
    }

    /// Make every publish fail.
    pub fn fail_publishes(&self) {
        self.state().fail_publish = true;
    }

    pub fn committed(&self) -> Vec<String> {
        self.state().committed.clone()
    }

    /// Published `(key, payload)` pairs in publish order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state().published.clone()
    }

    pub fn close_calls(&self) -> u32 {
        self.state().close_calls
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn fetch_next(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        let next = self.state().inbox.pop_front();
        match next {
            Some(Scripted::Message(message)) => Ok(Some(message)),
            Some(Scripted::Error(reason)) => Err(QueueError::connection_failed(reason)),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn commit(&self, message: &QueueMessage) -> QueueResult<()> {
        self.state().committed.push(message.id.clone());
        Ok(())
    }

    fn has_output(&self) -> bool {
        self.output
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> QueueResult<()> {
        if !self.output {
            return Err(QueueError::NoOutputTopic);
        }
        let mut state = self.state();
        if state.fail_publish {
            return Err(QueueError::connection_failed("publish rejected"));
        }
        state.published.push((key.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.state().close_calls += 1;
        Ok(())
    }
}
