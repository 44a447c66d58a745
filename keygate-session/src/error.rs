//! Error taxonomy for the license engine.
//!
//! Cryptographic and integrity failures collapse to the typed variants
//! below and never expose partial plaintext. Network failures are
//! recoverable — the session evaluates offline grace instead of bubbling
//! them up whenever it can.

use keygate_crypto::CryptoError;
use keygate_store::StoreError;
use serde_json::Value;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the license engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport failure. Recoverable; triggers offline-grace evaluation.
    #[error("network error: {0}")]
    Network(String),

    /// Response could not be decrypted. Treated as tampering, not retried.
    #[error("response decryption failed: {0}")]
    Decryption(String),

    /// Response signature did not verify. The response is discarded whole.
    #[error("response signature invalid")]
    SignatureInvalid,

    /// Response carried no signature field.
    #[error("response is missing its signature")]
    MissingSignature,

    /// Malformed payload; treated like a decryption failure.
    #[error("malformed payload: {0}")]
    Parse(String),

    /// This device is not on the license's authorized-device list.
    #[error("device not authorized for this license")]
    DeviceNotAuthorized,

    /// The nonce chain is out of sync with the authority.
    #[error("nonce chain out of sync")]
    NonceDesync,

    /// Cached state failed its integrity check.
    #[error("local state failed its integrity check")]
    StorageTampered,

    /// Every seat is taken by another device.
    #[error("no seat available")]
    SeatUnavailable,

    /// Seat release is rate-limited; retry after the given wait.
    #[error("seat release on cooldown, retry in {retry_after_secs}s")]
    SeatReleaseCooldown {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// Fatal authority directive; the host is expected to shut down.
    #[error("license terminated by the authority")]
    Terminated,

    /// License is suspended; entitlement checks are blocked.
    #[error("license suspended")]
    Suspended,

    /// License is revoked; entitlement checks are blocked.
    #[error("license revoked")]
    Revoked,

    /// License validity window has passed.
    #[error("license expired")]
    Expired,

    /// No license has been activated in this session.
    #[error("no license activated")]
    NotActivated,

    /// The license does not enable this feature (seats, tokens, offline).
    #[error("feature not enabled for this license: {0}")]
    FeatureDisabled(&'static str),

    /// The authority rejected the request with an unmapped code.
    #[error("authority rejected request ({code}): {message}")]
    Rejected {
        /// Machine-readable rejection code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// State store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Maps a verified server-reported error object to a typed variant.
    pub(crate) fn from_server_error(error: &Value) -> Self {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match code {
            "NONCE_MISMATCH" => Self::NonceDesync,
            "DEVICE_NOT_AUTHORIZED" => Self::DeviceNotAuthorized,
            "NO_SEAT_AVAILABLE" => Self::SeatUnavailable,
            "SEAT_RELEASE_COOLDOWN" => Self::SeatReleaseCooldown {
                retry_after_secs: error
                    .get("retryAfter")
                    .and_then(Value::as_u64)
                    .unwrap_or(60),
            },
            "LICENSE_TERMINATED" => Self::Terminated,
            "LICENSE_SUSPENDED" => Self::Suspended,
            "LICENSE_REVOKED" => Self::Revoked,
            "LICENSE_EXPIRED" => Self::Expired,
            _ => Self::Rejected {
                code: code.to_string(),
                message,
            },
        }
    }

}

impl From<CryptoError> for EngineError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::MissingSignature => Self::MissingSignature,
            CryptoError::InvalidSignature => Self::SignatureInvalid,
            CryptoError::Decryption(msg) => Self::Decryption(msg),
            CryptoError::Encryption(msg) => Self::Parse(msg),
            CryptoError::InvalidKey(msg) => Self::Parse(msg),
            CryptoError::Serialization(e) => Self::Serialization(e),
        }
    }
}
