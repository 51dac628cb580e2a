//! Shared error and result types for Storygate

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StorygateError>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum StorygateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Content store error: {0}")]
    Store(String),

    /// All credentials were tried without success for a single logical call.
    #[error("Content store exhausted after {attempts} attempts during {operation} ({target})")]
    StoreExhausted {
        operation: &'static str,
        target: String,
        attempts: u32,
    },

    #[error("No ledger RPC endpoint answered the liveness probe")]
    LedgerUnavailable,

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StorygateError {
    fn from(e: rusqlite::Error) -> Self {
        StorygateError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorygateError {
    fn from(e: serde_json::Error) -> Self {
        StorygateError::Internal(format!("JSON error: {}", e))
    }
}

impl From<std::io::Error> for StorygateError {
    fn from(e: std::io::Error) -> Self {
        StorygateError::Internal(format!("I/O error: {}", e))
    }
}
