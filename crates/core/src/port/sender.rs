// Async Sender Port
// Abstraction over the outbound transport fed by the dispatch loop

use crate::domain::OutboundMessage;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Sender errors
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Sender channels already taken")]
    ChannelsTaken,

    #[error("Sender closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure surfaced by the transport for a message it had accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    pub message: Option<OutboundMessage>,
    pub reason: String,
}

impl DeliveryError {
    pub fn new(message: Option<OutboundMessage>, reason: impl Into<String>) -> Self {
        Self {
            message,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "err=[{}] {}", self.reason, msg),
            None => write!(f, "err=[{}]", self.reason),
        }
    }
}

/// Input and error sides of a transport
pub struct SenderChannels {
    pub input: mpsc::Sender<OutboundMessage>,
    pub errors: mpsc::Receiver<DeliveryError>,
}

/// Async Sender trait
///
/// Implementations own their buffering and flushing. The dispatch loop only
/// forwards into `input` and reports what arrives on `errors`.
#[async_trait]
pub trait AsyncSender: Send + Sync {
    /// Hand out the transport channels
    ///
    /// # Errors
    /// - SenderError::ChannelsTaken on every call after the first
    fn channels(&self) -> Result<SenderChannels, SenderError>;

    /// Flush everything already accepted on `input`, then release the transport
    async fn close(&self) -> Result<(), SenderError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock transport that collects accepted messages in memory
    pub struct MockSender {
        input_tx: mpsc::Sender<OutboundMessage>,
        input_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
        errors_tx: Mutex<Option<mpsc::Sender<DeliveryError>>>,
        errors_rx: Mutex<Option<mpsc::Receiver<DeliveryError>>>,
        delivered: Mutex<Vec<OutboundMessage>>,
        close_count: AtomicUsize,
    }

    impl MockSender {
        pub fn new(input_capacity: usize) -> Self {
            let (input_tx, input_rx) = mpsc::channel(input_capacity);
            let (errors_tx, errors_rx) = mpsc::channel(16);
            Self {
                input_tx,
                input_rx: Mutex::new(input_rx),
                errors_tx: Mutex::new(Some(errors_tx)),
                errors_rx: Mutex::new(Some(errors_rx)),
                delivered: Mutex::new(Vec::new()),
                close_count: AtomicUsize::new(0),
            }
        }

        /// Everything the transport accepted so far, in arrival order
        pub fn delivered(&self) -> Vec<OutboundMessage> {
            self.pull();
            self.delivered.lock().unwrap().clone()
        }

        /// Surface a transport failure on the error channel
        pub fn inject_error(&self, error: DeliveryError) {
            if let Some(tx) = self.errors_tx.lock().unwrap().as_ref() {
                tx.try_send(error).unwrap();
            }
        }

        pub fn close_count(&self) -> usize {
            self.close_count.load(Ordering::SeqCst)
        }

        fn pull(&self) {
            let mut rx = self.input_rx.lock().unwrap();
            let mut delivered = self.delivered.lock().unwrap();
            while let Ok(msg) = rx.try_recv() {
                delivered.push(msg);
            }
        }
    }

    #[async_trait]
    impl AsyncSender for MockSender {
        fn channels(&self) -> Result<SenderChannels, SenderError> {
            let errors = self
                .errors_rx
                .lock()
                .unwrap()
                .take()
                .ok_or(SenderError::ChannelsTaken)?;
            Ok(SenderChannels {
                input: self.input_tx.clone(),
                errors,
            })
        }

        async fn close(&self) -> Result<(), SenderError> {
            self.pull();
            self.errors_tx.lock().unwrap().take();
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
