use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed input, rejected before any backend interaction.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A key or value could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The backend could not be reached or failed mid-request. Nothing was written.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The commit was handed to the backend but its outcome is unknown.
    ///
    /// Re-read the affected keys before retrying.
    #[error("Commit outcome unknown: {0}")]
    AmbiguousCommit(String),

    /// One or more checks of an atomic operation did not hold.
    #[error("Atomic check failed")]
    Conflict,

    #[error("Store is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TesseraError {
    /// Errors that leave no trace in the store and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TesseraError::Connectivity(_) | TesseraError::Io(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TesseraError::Conflict)
    }
}

impl From<bincode::Error> for TesseraError {
    fn from(err: bincode::Error) -> Self {
        TesseraError::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        TesseraError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TesseraError::Connectivity("down".into()).is_retryable());
        assert!(TesseraError::Io(io::Error::other("disk")).is_retryable());
        assert!(!TesseraError::AmbiguousCommit("lost".into()).is_retryable());
        assert!(!TesseraError::Validation("bad".into()).is_retryable());
        assert!(TesseraError::Conflict.is_conflict());
    }
}
