//! Ed25519 verification of authority signatures.
//!
//! The authority signs the canonicalized response object with the
//! `signature` field removed; the signature travels as standard base64.
//! Verification is all-or-nothing — a failed check means the whole response
//! is discarded by the caller.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Verifies `signature_b64` over `message` with the project's public key.
///
/// # Errors
///
/// `InvalidKey` for malformed key material, `InvalidSignature` when the
/// signature does not verify or cannot be decoded.
pub fn verify_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature_b64: &str,
) -> CryptoResult<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 public key".to_string()))?;

    let sig_bytes = BASE64
        .decode(signature_b64)
        .map_err(|_| CryptoError::InvalidSignature)?;

    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}
