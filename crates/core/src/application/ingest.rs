// Ingest Adapter - pulls from a message source into the worker pool queue

use crate::application::worker::constants::ERROR_RECOVERY_SLEEP_DURATION;
use crate::application::worker::{ShutdownToken, TaskSink};
use crate::error::Result;
use crate::port::MessageSource;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Counters for one adapter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub committed: u64,
    pub source_errors: u64,
}

/// Moves messages from a [`MessageSource`] into a [`TaskSink`]
///
/// A message is committed upstream only after the queue accepted it, so a crash
/// in between means re-delivery, not loss.
pub struct IngestAdapter<S: MessageSource> {
    source: S,
    sink: TaskSink,
}

impl<S: MessageSource> IngestAdapter<S> {
    pub fn new(source: S, sink: TaskSink) -> Self {
        Self { source, sink }
    }

    /// Consume until shutdown or end of stream
    ///
    /// # Errors
    /// - AppError::InvalidState if the task queue was torn down underneath the adapter
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<IngestStats> {
        info!("Ingest adapter started");
        let mut stats = IngestStats::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Ingest adapter interrupted by shutdown");
                    break;
                }
                next = self.source.next() => match next {
                    Ok(Some(message)) => {
                        stats.received += 1;
                        let offset = message.offset;
                        // Backpressure: blocks here while the task queue is full.
                        // Abandoned on shutdown; uncommitted, so it is redelivered.
                        tokio::select! {
                            biased;
                            _ = shutdown.wait() => {
                                info!(offset, "Ingest adapter interrupted while queue was full");
                                break;
                            }
                            queued = self.sink.enqueue(message.task_key(), message.value.clone()) => queued?,
                        }
                        match self.source.commit(&message).await {
                            Ok(()) => stats.committed += 1,
                            Err(e) => warn!(offset, error = %e, "Commit failed, message may be redelivered"),
                        }
                        debug!(offset, topic = %message.topic, "Message handed to worker pool");
                    }
                    Ok(None) => {
                        info!("Message source ended");
                        break;
                    }
                    Err(e) => {
                        stats.source_errors += 1;
                        error!(error = %e, "Message source failed, retrying");
                        tokio::select! {
                            _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {}
                            _ = shutdown.wait() => {
                                info!("Ingest adapter interrupted during error recovery");
                                break;
                            }
                        }
                    }
                },
            }
        }

        info!(
            received = stats.received,
            committed = stats.committed,
            "Ingest adapter stopped"
        );
        Ok(stats)
    }
}
