//! Error types for the state store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption or decryption failed while sealing a value.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Key contains characters the store does not accept.
    #[error("invalid store key: {0}")]
    InvalidKey(String),
}
