// Pipeline Observer Port
// Observability hooks for the worker pool and the dispatcher

use crate::domain::OutboundMessage;
use crate::port::DeliveryError;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Why an outbound message never reached the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    QueueFull,
    Closed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::QueueFull => write!(f, "msgQ is full"),
            DropReason::Closed => write!(f, "dispatcher closed"),
        }
    }
}

/// Observability hooks
///
/// Every hook defaults to a no-op so embedders only implement what they export.
/// Hooks run inline on the worker or dispatch loop and must not block.
pub trait PipelineObserver: Send + Sync {
    /// A worker finished a non-empty drain cycle
    fn batch_processed(&self, _worker: usize, _count: usize, _draining: bool) {}

    /// A handler call panicked; the batch carried on
    fn handler_panicked(&self, _worker: usize, _key: &str, _reason: &str) {}

    /// `send` refused a message
    fn message_dropped(&self, _message: &OutboundMessage, _reason: DropReason) {}

    /// The transport reported a failure
    fn delivery_failed(&self, _error: &DeliveryError) {}

    /// All workers exited; `residual` tasks were still queued
    fn pool_closed(&self, _processed: u64, _residual: usize) {}

    /// The dispatch loop exited; `flushed` queued messages were forwarded on the way out
    fn dispatcher_closed(&self, _flushed: usize) {}
}

/// Default observer: structured log lines through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn batch_processed(&self, worker: usize, count: usize, draining: bool) {
        if draining {
            info!(worker, count, "Processed batch while quitting");
        } else {
            debug!(worker, count, "Processed batch");
        }
    }

    fn handler_panicked(&self, worker: usize, key: &str, reason: &str) {
        error!(worker, key, panic_msg = %reason, "Handler panicked");
    }

    fn message_dropped(&self, message: &OutboundMessage, reason: DropReason) {
        warn!(
            reason = %reason,
            topic = %message.topic,
            key = message.key.as_deref().unwrap_or(""),
            value = %String::from_utf8_lossy(&message.value),
            "Outbound message dropped"
        );
    }

    fn delivery_failed(&self, error: &DeliveryError) {
        error!(error = %error, "Transport failed to deliver message");
    }

    fn pool_closed(&self, processed: u64, residual: usize) {
        if residual > 0 {
            warn!(processed, residual, "Worker pool closed with tasks remaining");
        } else {
            info!(processed, "Worker pool closed");
        }
    }

    fn dispatcher_closed(&self, flushed: usize) {
        info!(flushed, "Dispatcher closed");
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records every event it receives
    #[derive(Default)]
    pub struct RecordingObserver {
        pub batches: Mutex<Vec<(usize, usize, bool)>>,
        pub panics: Mutex<Vec<String>>,
        pub drops: Mutex<Vec<(OutboundMessage, DropReason)>>,
        pub failures: Mutex<Vec<DeliveryError>>,
        pub closed: Mutex<Option<(u64, usize)>>,
        pub flushed: Mutex<Option<usize>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn drop_count(&self) -> usize {
            self.drops.lock().unwrap().len()
        }

        pub fn batch_counts(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(|b| b.1).collect()
        }
    }

    impl PipelineObserver for RecordingObserver {
        fn batch_processed(&self, worker: usize, count: usize, draining: bool) {
            self.batches.lock().unwrap().push((worker, count, draining));
        }

        fn handler_panicked(&self, _worker: usize, key: &str, _reason: &str) {
            self.panics.lock().unwrap().push(key.to_string());
        }

        fn message_dropped(&self, message: &OutboundMessage, reason: DropReason) {
            self.drops.lock().unwrap().push((message.clone(), reason));
        }

        fn delivery_failed(&self, error: &DeliveryError) {
            self.failures.lock().unwrap().push(error.clone());
        }

        fn pool_closed(&self, processed: u64, residual: usize) {
            *self.closed.lock().unwrap() = Some((processed, residual));
        }

        fn dispatcher_closed(&self, flushed: usize) {
            *self.flushed.lock().unwrap() = Some(flushed);
        }
    }
}
