use thiserror::Error;

pub type CheckinResult<T> = Result<T, CheckinError>;

#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CheckinError {
    /// Transient failures are safe to retry: a same-day retry of a credited
    /// check-in lands on the duplicate gate instead of a second credit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckinError::Storage(_) | CheckinError::Conflict(_))
    }
}
