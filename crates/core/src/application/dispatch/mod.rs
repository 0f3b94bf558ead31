// Dispatcher - non-blocking outbound queue feeding a single forwarding loop

use crate::application::worker::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::{DispatchConfig, OutboundMessage};
use crate::error::{AppError, Result};
use crate::port::{
    AsyncSender, DeliveryError, DropReason, PipelineObserver, TracingObserver,
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why `send` refused a message; the message is handed back
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    QueueFull(OutboundMessage),

    #[error("dispatcher is closed")]
    Closed(OutboundMessage),
}

impl DispatchError {
    pub fn into_message(self) -> OutboundMessage {
        match self {
            DispatchError::QueueFull(msg) | DispatchError::Closed(msg) => msg,
        }
    }
}

/// Cloneable producer handle; `send` never waits
#[derive(Clone)]
pub struct DispatchHandle {
    topic: Arc<str>,
    queue: mpsc::Sender<OutboundMessage>,
    observer: Arc<dyn PipelineObserver>,
}

impl DispatchHandle {
    /// Queue `value` for the dispatcher's default topic
    pub fn send(
        &self,
        value: impl Into<Bytes>,
        key: Option<String>,
    ) -> std::result::Result<(), DispatchError> {
        self.send_message(OutboundMessage::new(&*self.topic, key, value))
    }

    /// Queue `value` for an explicit topic
    pub fn send_to(
        &self,
        topic: impl Into<String>,
        value: impl Into<Bytes>,
        key: Option<String>,
    ) -> std::result::Result<(), DispatchError> {
        self.send_message(OutboundMessage::new(topic, key, value))
    }

    /// Queue a prepared message; when the queue is full it is dropped and reported
    pub fn send_message(&self, message: OutboundMessage) -> std::result::Result<(), DispatchError> {
        match self.queue.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                self.observer.message_dropped(&message, DropReason::QueueFull);
                Err(DispatchError::QueueFull(message))
            }
            Err(TrySendError::Closed(message)) => {
                self.observer.message_dropped(&message, DropReason::Closed);
                Err(DispatchError::Closed(message))
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Owns the dispatch queue and the loop forwarding it to an [`AsyncSender`]
pub struct Dispatcher {
    config: DispatchConfig,
    handle: DispatchHandle,
    queue_rx: Option<mpsc::Receiver<OutboundMessage>>,
    sender: Arc<dyn AsyncSender>,
    observer: Arc<dyn PipelineObserver>,
    close_tx: ShutdownSender,
    loop_handle: Option<JoinHandle<usize>>,
}

impl Dispatcher {
    pub fn new(
        topic: impl Into<String>,
        config: DispatchConfig,
        sender: Arc<dyn AsyncSender>,
    ) -> Result<Self> {
        config.validate()?;
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);
        let topic: String = topic.into();
        let (close_tx, _) = shutdown_channel();
        Ok(Self {
            config,
            handle: DispatchHandle {
                topic: Arc::from(topic),
                queue: queue_tx,
                observer: Arc::clone(&observer),
            },
            queue_rx: Some(queue_rx),
            sender,
            observer,
            close_tx,
            loop_handle: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.handle.observer = Arc::clone(&observer);
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Producer handle that can be shared with handlers and other tasks
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// See [`DispatchHandle::send`]
    pub fn send(
        &self,
        value: impl Into<Bytes>,
        key: Option<String>,
    ) -> std::result::Result<(), DispatchError> {
        self.handle.send(value, key)
    }

    /// Start the forwarding loop
    ///
    /// The loop stops on `shutdown` or on [`Dispatcher::close`], whichever comes first.
    pub fn run(&mut self, shutdown: ShutdownToken) -> Result<()> {
        if self.queue_rx.is_none() {
            return Err(AppError::InvalidState(
                "dispatcher already running".to_string(),
            ));
        }
        // Queue is only handed to the loop once the transport is ready
        let channels = self.sender.channels()?;
        let queue = self
            .queue_rx
            .take()
            .ok_or_else(|| AppError::InvalidState("dispatcher already running".to_string()))?;

        let dispatch_loop = DispatchLoop {
            queue,
            input: channels.input,
            errors: Some(channels.errors),
            observer: Arc::clone(&self.observer),
        };
        self.loop_handle = Some(tokio::spawn(
            dispatch_loop.run(shutdown, self.close_tx.token()),
        ));
        info!(
            topic = %self.handle.topic,
            capacity = self.config.queue_capacity,
            "Dispatcher started"
        );
        Ok(())
    }

    /// Stop the loop, wait for it, then close the transport
    ///
    /// Messages still queued when the loop stops are forwarded before the
    /// transport is closed. Returns how many that was.
    pub async fn close(mut self) -> Result<usize> {
        self.close_tx.shutdown();
        info!("Dispatcher is quitting");

        let flushed = match self.loop_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| AppError::Internal(format!("dispatch loop failed: {}", e)))?,
            None => {
                // Never ran: nothing can be forwarded, report what is lost
                if let Some(mut queue) = self.queue_rx.take() {
                    queue.close();
                    while let Ok(msg) = queue.try_recv() {
                        self.observer.message_dropped(&msg, DropReason::Closed);
                    }
                }
                0
            }
        };
        self.observer.dispatcher_closed(flushed);

        self.sender.close().await?;
        info!("Dispatcher quit over");
        Ok(flushed)
    }
}

/// The single forwarding loop
struct DispatchLoop {
    queue: mpsc::Receiver<OutboundMessage>,
    input: mpsc::Sender<OutboundMessage>,
    errors: Option<mpsc::Receiver<DeliveryError>>,
    observer: Arc<dyn PipelineObserver>,
}

impl DispatchLoop {
    async fn run(self, mut shutdown: ShutdownToken, mut close: ShutdownToken) -> usize {
        let DispatchLoop {
            mut queue,
            input,
            mut errors,
            observer,
        } = self;

        loop {
            tokio::select! {
                // Stop signals win so a busy queue cannot delay quitting
                biased;
                _ = shutdown.wait() => break,
                _ = close.wait() => break,
                err = next_error(&mut errors) => match err {
                    Some(err) => observer.delivery_failed(&err),
                    None => {
                        debug!("Transport error channel closed");
                        errors = None;
                    }
                },
                msg = queue.recv() => match msg {
                    Some(msg) => forward(&input, msg, observer.as_ref()).await,
                    None => break,
                },
            }
        }

        // Stop accepting, then hand over whatever made it into the queue
        queue.close();
        let mut flushed = 0;
        while let Ok(msg) = queue.try_recv() {
            forward(&input, msg, observer.as_ref()).await;
            flushed += 1;
        }
        if flushed > 0 {
            warn!(flushed, "Forwarded queued messages while quitting");
        }
        flushed
    }
}

async fn forward(
    input: &mpsc::Sender<OutboundMessage>,
    msg: OutboundMessage,
    observer: &dyn PipelineObserver,
) {
    if let Err(mpsc::error::SendError(msg)) = input.send(msg).await {
        observer.delivery_failed(&DeliveryError::new(Some(msg), "transport input closed"));
    }
}

async fn next_error(errors: &mut Option<mpsc::Receiver<DeliveryError>>) -> Option<DeliveryError> {
    match errors {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::observer::mocks::RecordingObserver;
    use crate::port::sender::mocks::MockSender;
    use crate::port::SenderError;
    use std::time::Duration;

    fn dispatcher(capacity: usize) -> (Dispatcher, Arc<MockSender>, Arc<RecordingObserver>) {
        let sender = Arc::new(MockSender::new(64));
        let observer = Arc::new(RecordingObserver::new());
        let dispatcher = Dispatcher::new(
            "events",
            DispatchConfig::default().with_queue_capacity(capacity),
            sender.clone(),
        )
        .unwrap()
        .with_observer(observer.clone());
        (dispatcher, sender, observer)
    }

    async fn wait_delivered(sender: &MockSender, n: usize) -> Vec<OutboundMessage> {
        for _ in 0..100 {
            let delivered = sender.delivered();
            if delivered.len() >= n {
                return delivered;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        sender.delivered()
    }

    #[tokio::test]
    async fn test_full_queue_drops_third_send() {
        let (dispatcher, _sender, observer) = dispatcher(2);

        assert!(dispatcher.send("a", None).is_ok());
        assert!(dispatcher.send("b", Some("k".to_string())).is_ok());
        let err = dispatcher.send("c", Some("k3".to_string())).unwrap_err();

        assert!(matches!(err, DispatchError::QueueFull(_)));
        let dropped = err.into_message();
        assert_eq!(dropped.value, Bytes::from_static(b"c"));
        assert_eq!(dropped.key.as_deref(), Some("k3"));
        assert_eq!(observer.drop_count(), 1);
        assert_eq!(observer.drops.lock().unwrap()[0].1, DropReason::QueueFull);
    }

    #[tokio::test]
    async fn test_forwards_in_order() {
        let (mut dispatcher, sender, _observer) = dispatcher(16);
        let (_tx, token) = shutdown_channel();
        dispatcher.run(token).unwrap();

        let handle = dispatcher.handle();
        for i in 0..10 {
            handle.send(format!("m{i}"), None).unwrap();
        }
        let delivered = wait_delivered(&sender, 10).await;
        let values: Vec<String> = delivered
            .iter()
            .map(|m| String::from_utf8_lossy(&m.value).into_owned())
            .collect();
        assert_eq!(values, (0..10).map(|i| format!("m{i}")).collect::<Vec<_>>());
        assert!(delivered.iter().all(|m| m.topic == "events"));

        dispatcher.close().await.unwrap();
        assert_eq!(sender.close_count(), 1);
    }

    #[tokio::test]
    async fn test_send_to_overrides_topic() {
        let (mut dispatcher, sender, _observer) = dispatcher(4);
        let (_tx, token) = shutdown_channel();
        dispatcher.run(token).unwrap();
        dispatcher
            .handle()
            .send_to("audit", "x", Some("id-1".to_string()))
            .unwrap();
        dispatcher.close().await.unwrap();

        let delivered = sender.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].topic, "audit");
    }

    #[tokio::test]
    async fn test_sender_errors_are_reported_and_loop_continues() {
        let (mut dispatcher, sender, observer) = dispatcher(4);
        let (_tx, token) = shutdown_channel();
        dispatcher.run(token).unwrap();

        sender.inject_error(DeliveryError::new(None, "leader not available"));
        dispatcher.send("after-error", None).unwrap();
        wait_delivered(&sender, 1).await;

        for _ in 0..100 {
            if !observer.failures.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(observer.failures.lock().unwrap().len(), 1);
        assert_eq!(sender.delivered().len(), 1);
        dispatcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_flushes_queue_then_closes_sender() {
        let (mut dispatcher, sender, observer) = dispatcher(8);
        let handle = dispatcher.handle();
        for i in 0..5 {
            handle.send(format!("m{i}"), None).unwrap();
        }
        // Shared signal already fired: the loop exits straight away
        let (tx, token) = shutdown_channel();
        tx.shutdown();
        dispatcher.run(token).unwrap();

        dispatcher.close().await.unwrap();
        assert_eq!(sender.delivered().len(), 5);
        assert_eq!(*observer.flushed.lock().unwrap(), Some(5));
        assert_eq!(sender.close_count(), 1);

        assert!(matches!(
            handle.send("late", None),
            Err(DispatchError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let (mut dispatcher, _sender, _observer) = dispatcher(4);
        let (_tx, token) = shutdown_channel();
        dispatcher.run(token.clone()).unwrap();
        assert!(matches!(
            dispatcher.run(token),
            Err(AppError::InvalidState(_))
        ));
        dispatcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_without_run_reports_queued_as_dropped() {
        let (dispatcher, sender, observer) = dispatcher(4);
        dispatcher.send("never-forwarded", None).unwrap();
        assert_eq!(dispatcher.close().await.unwrap(), 0);
        assert_eq!(observer.drop_count(), 1);
        assert_eq!(observer.drops.lock().unwrap()[0].1, DropReason::Closed);
        assert_eq!(sender.close_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_keeps_queued_messages_reported() {
        let (mut dispatcher, sender, observer) = dispatcher(4);
        dispatcher.send("queued-before-run", None).unwrap();
        // Another owner already holds the transport channels
        let _taken = sender.channels().unwrap();

        let (_tx, token) = shutdown_channel();
        assert!(matches!(
            dispatcher.run(token),
            Err(AppError::Sender(SenderError::ChannelsTaken))
        ));

        assert_eq!(dispatcher.close().await.unwrap(), 0);
        assert_eq!(observer.drop_count() + sender.delivered().len(), 1);
        assert_eq!(observer.drops.lock().unwrap()[0].1, DropReason::Closed);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Dispatcher::new(
            "events",
            DispatchConfig::default().with_queue_capacity(0),
            Arc::new(MockSender::new(1)),
        );
        assert!(matches!(result, Err(AppError::Domain(_))));
    }
}
