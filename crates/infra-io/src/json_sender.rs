// JSON-lines sender
// Async transport writing each outbound message as one JSON object per line
use async_trait::async_trait;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use batchwork_core::application::worker::constants::DELIVERY_ERROR_CHANNEL_CAPACITY;
use batchwork_core::domain::OutboundMessage;
use batchwork_core::port::{AsyncSender, DeliveryError, SenderChannels, SenderError};

/// Default number of messages the writer task buffers before `input` applies backpressure
pub const DEFAULT_INPUT_CAPACITY: usize = 256;

#[derive(Serialize)]
struct Record<'a> {
    topic: &'a str,
    key: Option<&'a str>,
    value: Cow<'a, str>,
}

/// Sender backed by a background writer task
///
/// Output is buffered and flushed every `flush_interval` while there is
/// unflushed data, and once more on close.
pub struct JsonLinesSender {
    input: Mutex<Option<mpsc::Sender<OutboundMessage>>>,
    errors: Mutex<Option<mpsc::Receiver<DeliveryError>>>,
    writer: tokio::sync::Mutex<Option<JoinHandle<Result<u64, SenderError>>>>,
}

impl JsonLinesSender {
    /// Spawn the writer task; must be called inside a tokio runtime
    pub fn new<W>(writer: W, flush_interval: Duration, input_capacity: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (input_tx, input_rx) = mpsc::channel(input_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(DELIVERY_ERROR_CHANNEL_CAPACITY);
        let handle = tokio::spawn(write_loop(
            BufWriter::new(writer),
            input_rx,
            errors_tx,
            flush_interval,
        ));
        Self {
            input: Mutex::new(Some(input_tx)),
            errors: Mutex::new(Some(errors_rx)),
            writer: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Sender over the process's standard output
    pub fn stdout(flush_interval: Duration) -> Self {
        Self::new(tokio::io::stdout(), flush_interval, DEFAULT_INPUT_CAPACITY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl AsyncSender for JsonLinesSender {
    fn channels(&self) -> Result<SenderChannels, SenderError> {
        let input = lock(&self.input).clone().ok_or(SenderError::Closed)?;
        let errors = lock(&self.errors).take().ok_or(SenderError::ChannelsTaken)?;
        Ok(SenderChannels { input, errors })
    }

    async fn close(&self) -> Result<(), SenderError> {
        // The writer stops once every input handle is gone
        lock(&self.input).take();
        let Some(handle) = self.writer.lock().await.take() else {
            return Ok(());
        };
        let written = handle
            .await
            .map_err(|e| SenderError::Transport(format!("writer task failed: {}", e)))??;
        info!(written, "JSON-lines sender closed");
        Ok(())
    }
}

async fn write_loop<W>(
    mut writer: BufWriter<W>,
    mut input: mpsc::Receiver<OutboundMessage>,
    errors: mpsc::Sender<DeliveryError>,
    flush_interval: Duration,
) -> Result<u64, SenderError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut ticker = interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut dirty = false;
    let mut written = 0u64;

    loop {
        tokio::select! {
            msg = input.recv() => {
                let Some(msg) = msg else { break };
                match write_record(&mut writer, &msg).await {
                    Ok(()) => {
                        dirty = true;
                        written += 1;
                    }
                    Err(e) => report(&errors, DeliveryError::new(Some(msg), e.to_string())),
                }
            }
            _ = ticker.tick(), if dirty => {
                if let Err(e) = writer.flush().await {
                    report(&errors, DeliveryError::new(None, format!("flush failed: {}", e)));
                }
                dirty = false;
            }
        }
    }

    debug!(written, "Writer input closed, flushing");
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(written)
}

async fn write_record<W>(writer: &mut BufWriter<W>, msg: &OutboundMessage) -> Result<(), SenderError>
where
    W: AsyncWrite + Unpin + Send,
{
    let record = Record {
        topic: &msg.topic,
        key: msg.key.as_deref(),
        value: String::from_utf8_lossy(&msg.value),
    };
    let mut line =
        serde_json::to_vec(&record).map_err(|e| SenderError::Transport(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

fn report(errors: &mpsc::Sender<DeliveryError>, error: DeliveryError) {
    if let Err(e) = errors.try_send(error) {
        warn!(error = %e, "Delivery error channel unavailable, error discarded");
    }
}
