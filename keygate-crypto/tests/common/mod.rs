//! Shared test helpers for crypto tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signer, SigningKey};

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        7, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key.to_bytes())
}

/// Signs a message and returns the standard-base64 signature.
pub fn sign_b64(signing_key: &SigningKey, message: &[u8]) -> String {
    BASE64.encode(signing_key.sign(message).to_bytes())
}

/// A fixed 32-byte symmetric key for cipher tests.
pub fn test_payload_key() -> keygate_crypto::PayloadKey {
    keygate_crypto::PayloadKey::from_bytes([42u8; 32])
}
