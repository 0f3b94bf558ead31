// Batchwork Infrastructure - Stream Adapters
// Implements: MessageSource, AsyncSender

pub mod json_sender;
pub mod line_source;

pub use json_sender::JsonLinesSender;
pub use line_source::LineSource;
