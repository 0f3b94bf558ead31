// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Source error: {0}")]
    Source(#[from] crate::port::SourceError),

    #[error("Sender error: {0}")]
    Sender(#[from] crate::port::SenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
