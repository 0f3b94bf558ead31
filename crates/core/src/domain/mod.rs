// Domain Layer - Pure data and invariants

pub mod error;
pub mod message;
pub mod queue;
pub mod task;

// Re-exports
pub use error::DomainError;
pub use message::OutboundMessage;
pub use queue::{DispatchConfig, WorkerPoolConfig};
pub use task::{InboundMessage, Task};
