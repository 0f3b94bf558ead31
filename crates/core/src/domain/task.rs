// Task Domain Model (ingest side)

use bytes::Bytes;

/// Unit of ingest work queued for asynchronous handling.
///
/// Immutable once built. The queue owns it until a worker drains it; the worker
/// hands the payload to the handler and drops the task afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    key: String,
    payload: Bytes,
}

impl Task {
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Split into key and payload, consuming the task
    pub fn into_parts(self) -> (String, Bytes) {
        (self.key, self.payload)
    }
}

/// Message as delivered by an upstream streaming source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, offset: i64, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset,
            key: None,
            value: value.into(),
        }
    }

    /// Key under which the message is queued: `{topic}-{value}`.
    ///
    /// Non UTF-8 bytes in the value are replaced, the key is only used for diagnostics.
    pub fn task_key(&self) -> String {
        format!("{}-{}", self.topic, String::from_utf8_lossy(&self.value))
    }

    pub fn into_task(self) -> Task {
        Task::new(self.task_key(), self.value)
    }
}
