// Queue Configuration Domain Model

use super::error::{DomainError, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default task queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;
/// Default number of worker loops
pub const DEFAULT_THREAD_COUNT: usize = 1;
/// Default batch tick interval (5s)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5000;
/// Default maximum tasks drained per tick
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Default dispatch queue capacity
pub const DEFAULT_DISPATCH_CAPACITY: usize = 400;
/// Default transport flush interval (5ms)
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5;

/// Worker pool configuration, immutable once the pool is built
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub queue_capacity: usize,
    pub thread_count: usize,
    pub tick_interval_ms: u64,
    pub batch_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_count: DEFAULT_THREAD_COUNT,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    pub fn with_tick_interval_ms(mut self, tick_ms: u64) -> Self {
        self.tick_interval_ms = tick_ms;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Delay before worker `index` starts ticking: `index * tick / thread_count`
    pub fn stagger_offset(&self, index: usize) -> Duration {
        let threads = self.thread_count.max(1) as u32;
        self.tick_interval() * index as u32 / threads
    }

    /// Reject configurations that can never make progress
    pub fn validate(&self) -> Result<()> {
        validate_capacity("queue_capacity", self.queue_capacity)?;
        if self.thread_count == 0 {
            return Err(DomainError::invalid_config("thread_count", "must be >= 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(DomainError::invalid_config(
                "tick_interval_ms",
                "must be >= 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(DomainError::invalid_config("batch_size", "must be >= 1"));
        }
        Ok(())
    }
}

/// Dispatch queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    /// Forwarded to the transport; the dispatch loop itself never waits on it
    pub flush_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_DISPATCH_CAPACITY,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl DispatchConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_capacity("queue_capacity", self.queue_capacity)?;
        if self.flush_interval_ms == 0 {
            return Err(DomainError::invalid_config(
                "flush_interval_ms",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

fn validate_capacity(field: &'static str, capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(DomainError::invalid_config(field, "must be >= 1"));
    }
    if capacity > Semaphore::MAX_PERMITS {
        return Err(DomainError::invalid_config(
            field,
            format!("must be <= {}", Semaphore::MAX_PERMITS),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.queue_capacity, 2048);
        assert_eq!(config.thread_count, 1);
        assert_eq!(config.tick_interval(), Duration::from_millis(5000));
        assert_eq!(config.batch_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = WorkerPoolConfig::default().with_thread_count(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("thread_count"));
    }

    #[test]
    fn test_zero_batch_and_tick_rejected() {
        assert!(WorkerPoolConfig::default()
            .with_batch_size(0)
            .validate()
            .is_err());
        assert!(WorkerPoolConfig::default()
            .with_tick_interval_ms(0)
            .validate()
            .is_err());
        assert!(WorkerPoolConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_stagger_offsets_spread_over_one_tick() {
        let config = WorkerPoolConfig::default()
            .with_thread_count(4)
            .with_tick_interval_ms(1000);
        assert_eq!(config.stagger_offset(0), Duration::ZERO);
        assert_eq!(config.stagger_offset(1), Duration::from_millis(250));
        assert_eq!(config.stagger_offset(3), Duration::from_millis(750));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: WorkerPoolConfig =
            serde_json::from_str(r#"{"thread_count": 3}"#).unwrap();
        assert_eq!(config.thread_count, 3);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);

        let dispatch: DispatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_dispatch_capacity_rejected() {
        let err = DispatchConfig::default()
            .with_queue_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidConfig {
                field: "queue_capacity",
                ..
            }
        ));
    }
}
