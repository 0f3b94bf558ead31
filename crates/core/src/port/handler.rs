// Task Handler Port
// Business logic plugged into the worker pool

use async_trait::async_trait;
use bytes::Bytes;

/// Handler capability invoked once per drained task
///
/// The pool awaits each call before moving to the next task of the batch.
/// Errors are the handler's own business; nothing is returned to the pool.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: Bytes);
}

/// Adapter turning a plain function into a [`TaskHandler`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap `f` so it can be used wherever a [`TaskHandler`] is expected
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Bytes) + Send + Sync,
{
    HandlerFn { f }
}

#[async_trait]
impl<F> TaskHandler for HandlerFn<F>
where
    F: Fn(Bytes) + Send + Sync,
{
    async fn handle(&self, payload: Bytes) {
        (self.f)(payload)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every payload it sees, in call order
    #[derive(Clone, Default)]
    pub struct RecordingHandler {
        seen: Arc<Mutex<Vec<Bytes>>>,
        panic_on: Option<Bytes>,
        delay: Option<Duration>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Panic (after recording) when this payload is handled
        pub fn panicking_on(mut self, payload: impl Into<Bytes>) -> Self {
            self.panic_on = Some(payload.into());
            self
        }

        /// Sleep before recording each payload
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn payloads(&self) -> Vec<Bytes> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&self, payload: Bytes) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().unwrap().push(payload.clone());
            if self.panic_on.as_ref() == Some(&payload) {
                panic!("handler rejected payload {:?}", payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_handler_fn_calls_wrapped_function() {
        let total = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&total);
        let handler = handler_fn(move |payload: Bytes| {
            counter.fetch_add(payload.len(), Ordering::SeqCst);
        });

        handler.handle(Bytes::from_static(b"abc")).await;
        handler.handle(Bytes::from_static(b"de")).await;

        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_handler_fn_as_trait_object() {
        let handler: Arc<dyn TaskHandler> = Arc::new(handler_fn(|_| {}));
        handler.handle(Bytes::new()).await;
    }
}
