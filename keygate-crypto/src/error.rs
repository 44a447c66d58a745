//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Response carried no signature field.
    #[error("response is missing its signature")]
    MissingSignature,

    /// Signature verification failed.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Key material is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
