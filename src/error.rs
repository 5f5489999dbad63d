//! Error types for eventsync

use thiserror::Error;

/// Result type alias for eventsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for eventsync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Check if error is retryable (transient transport or remote failure)
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Http(_) | SyncError::Remote { .. })
    }
}
