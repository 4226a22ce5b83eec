//! Inbound message envelope.

/// One message fetched from the input topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Broker-assigned id; used to commit
    pub id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    /// Set when the message was reclaimed from the pending list
    pub redelivered: bool,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload: payload.into(),
            redelivered: false,
        }
    }
}
