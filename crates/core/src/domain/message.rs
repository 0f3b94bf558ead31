// Outbound Message Domain Model (publish side)

use bytes::Bytes;
use std::fmt;

/// Message handed to the dispatch queue, built once per send call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub value: Bytes,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, key: Option<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key,
            value: value.into(),
        }
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic=[{}] key=[{}] val=[{}]",
            self.topic,
            self.key.as_deref().unwrap_or(""),
            String::from_utf8_lossy(&self.value)
        )
    }
}
