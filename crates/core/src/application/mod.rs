// Application Layer - batching services

pub mod dispatch;
pub mod ingest;
pub mod worker;

// Re-exports
pub use dispatch::{DispatchError, DispatchHandle, Dispatcher};
pub use ingest::{IngestAdapter, IngestStats};
pub use worker::{
    shutdown_channel, PoolReport, ShutdownSender, ShutdownToken, TaskSink, WorkerPool,
};
