// Port Layer - Interfaces for external collaborators

pub mod handler;
pub mod observer;
pub mod sender;
pub mod source;

// Re-exports
pub use handler::{handler_fn, HandlerFn, TaskHandler};
pub use observer::{DropReason, PipelineObserver, TracingObserver};
pub use sender::{AsyncSender, DeliveryError, SenderChannels, SenderError};
pub use source::{MessageSource, SourceError};
