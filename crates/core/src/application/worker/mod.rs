// Worker Pool - timer-driven batch draining of the task queue

pub mod constants;
mod panic_guard;
mod queue;
mod shutdown;

pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use queue::{TaskQueue, TaskSink};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::WorkerPoolConfig;
use crate::error::{AppError, Result};
use crate::port::{PipelineObserver, TaskHandler, TracingObserver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Outcome of a closed pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    /// Tasks handed to the handler over the pool's lifetime
    pub processed: u64,
    /// Tasks still queued once every worker exited
    pub residual: usize,
}

/// Pool of independent batch workers sharing one task queue
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    observer: Arc<dyn PipelineObserver>,
    processed: Arc<AtomicU64>,
    workers: Vec<JoinHandle<u64>>,
    started: bool,
}

impl WorkerPool {
    /// Build a pool; an invalid config is rejected here, never at runtime
    pub fn new(config: WorkerPoolConfig, handler: Arc<dyn TaskHandler>) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(TaskQueue::new(config.queue_capacity));
        Ok(Self {
            config,
            queue,
            handler,
            observer: Arc::new(TracingObserver),
            processed: Arc::new(AtomicU64::new(0)),
            workers: Vec::new(),
            started: false,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Producer handle for ingest adapters
    pub fn sink(&self) -> TaskSink {
        TaskSink::new(Arc::clone(&self.queue))
    }

    /// Tasks handled so far, across all workers
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Spawn `thread_count` worker loops
    ///
    /// Worker `i` first ticks `i * tick / thread_count` after the others so
    /// their drains do not line up.
    pub fn start(&mut self, shutdown: ShutdownToken) -> Result<()> {
        if self.started {
            return Err(AppError::InvalidState(
                "worker pool already started".to_string(),
            ));
        }
        self.started = true;

        let tick = self.config.tick_interval();
        let now = Instant::now();
        for index in 0..self.config.thread_count {
            let worker = BatchWorker {
                index,
                queue: Arc::clone(&self.queue),
                handler: Arc::clone(&self.handler),
                observer: Arc::clone(&self.observer),
                processed: Arc::clone(&self.processed),
                batch_size: self.config.batch_size,
                tick,
            };
            let first_tick = now + self.config.stagger_offset(index) + tick;
            self.workers
                .push(tokio::spawn(worker.run(first_tick, shutdown.clone())));
        }

        info!(
            threads = self.config.thread_count,
            batch_size = self.config.batch_size,
            tick_ms = self.config.tick_interval_ms,
            capacity = self.config.queue_capacity,
            "Worker pool started"
        );
        Ok(())
    }

    /// Wait for every worker to finish draining, then tear the queue down
    ///
    /// Workers only exit after the shutdown signal, so this blocks until it is sent.
    pub async fn close(mut self) -> PoolReport {
        for (index, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.await {
                error!(worker = index, error = %e, "Worker task failed");
            }
        }
        let residual = self.queue.len();
        self.queue.close();

        let report = PoolReport {
            processed: self.processed.load(Ordering::Relaxed),
            residual,
        };
        self.observer.pool_closed(report.processed, report.residual);
        report
    }
}

/// One worker loop; owns its drain cycle exclusively
struct BatchWorker {
    index: usize,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    observer: Arc<dyn PipelineObserver>,
    processed: Arc<AtomicU64>,
    batch_size: usize,
    tick: Duration,
}

impl BatchWorker {
    async fn run(self, first_tick: Instant, mut shutdown: ShutdownToken) -> u64 {
        info!(worker = self.index, "Worker started");
        let mut ticker = interval_at(first_tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = 0u64;

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(worker = self.index, "Worker is quitting");
                    total += self.drain_to_completion().await;
                    break;
                }
                _ = ticker.tick() => {
                    total += self.process_batch(false).await as u64;
                }
            }
        }

        info!(worker = self.index, processed = total, "Worker stopped");
        total
    }

    /// Keep draining, one tick apart, until a cycle comes back empty
    async fn drain_to_completion(&self) -> u64 {
        let mut total = 0u64;
        loop {
            let count = self.process_batch(true).await;
            if count == 0 {
                return total;
            }
            total += count as u64;
            sleep(self.tick).await;
        }
    }

    /// Claim and handle up to `batch_size` tasks, stopping as soon as the queue is empty
    async fn process_batch(&self, draining: bool) -> usize {
        let mut count = 0;
        while count < self.batch_size {
            let Some(task) = self.queue.try_pop() else {
                break;
            };
            let (key, payload) = task.into_parts();
            if let PanicGuardResult::Panicked(reason) =
                execute_guarded(self.handler.handle(payload)).await
            {
                self.observer.handler_panicked(self.index, &key, &reason);
            }
            count += 1;
        }

        if count > 0 {
            self.processed.fetch_add(count as u64, Ordering::Relaxed);
            self.observer.batch_processed(self.index, count, draining);
        }
        count
    }
}
