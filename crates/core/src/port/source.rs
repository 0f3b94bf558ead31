// Message Source Port
// Upstream stream feeding the ingest adapter

use crate::domain::InboundMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Commit failed at offset {offset}: {reason}")]
    Commit { offset: i64, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message Source trait
///
/// Implementations:
/// - LineSource (infra-io): one message per line of an async reader
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, `Ok(None)` once the stream has ended
    async fn next(&mut self) -> Result<Option<InboundMessage>, SourceError>;

    /// Acknowledge a message; only called after it was handed to the task queue
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), SourceError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted step of a mock source
    #[derive(Debug)]
    pub enum Step {
        Message(InboundMessage),
        Fail(String),
    }

    /// Source replaying a fixed script, then idling forever (or ending)
    pub struct ScriptedSource {
        steps: VecDeque<Step>,
        end_when_empty: bool,
        committed: Arc<Mutex<Vec<i64>>>,
    }

    impl ScriptedSource {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                end_when_empty: true,
                committed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn from_values(topic: &str, values: &[&str]) -> Self {
            let steps = values
                .iter()
                .enumerate()
                .map(|(i, v)| Step::Message(InboundMessage::new(topic, i as i64, v.to_string())))
                .collect();
            Self::new(steps)
        }

        /// Block on `next` after the script instead of reporting end of stream
        pub fn idle_when_empty(mut self) -> Self {
            self.end_when_empty = false;
            self
        }

        /// Shared view of committed offsets
        pub fn committed(&self) -> Arc<Mutex<Vec<i64>>> {
            Arc::clone(&self.committed)
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn next(&mut self) -> Result<Option<InboundMessage>, SourceError> {
            match self.steps.pop_front() {
                Some(Step::Message(msg)) => Ok(Some(msg)),
                Some(Step::Fail(reason)) => Err(SourceError::Unavailable(reason)),
                None if self.end_when_empty => Ok(None),
                None => {
                    std::future::pending::<()>().await;
                    Ok(None)
                }
            }
        }

        async fn commit(&mut self, message: &InboundMessage) -> Result<(), SourceError> {
            self.committed.lock().unwrap().push(message.offset);
            Ok(())
        }
    }
}
