// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid config: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl DomainError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
