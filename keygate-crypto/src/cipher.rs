//! Payload encryption using ChaCha20-Poly1305.
//!
//! Wire blobs and cached state entries are sealed with the project's
//! symmetric key and carried as base64 (nonce || ciphertext). The AEAD tag
//! makes any bit flip a decryption failure, which callers treat as
//! tampering, not as retryable noise.

use crate::error::{CryptoError, CryptoResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the symmetric key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// The project's symmetric payload key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PayloadKey {
    bytes: [u8; KEY_SIZE],
}

impl PayloadKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypted data with the metadata needed for decryption.
#[derive(Clone, Debug)]
pub struct EncryptedBlob {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encodes to base64 for the wire or storage.
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes from base64.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("blob too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        let ciphertext = bytes[NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypts plaintext with a fresh random nonce.
pub fn encrypt(key: &PayloadKey, plaintext: &[u8]) -> CryptoResult<EncryptedBlob> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedBlob {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts a blob; fails if the key is wrong or the data was altered.
pub fn decrypt(key: &PayloadKey, blob: &EncryptedBlob) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&blob.nonce);

    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}

/// Encrypts bytes and returns the base64 blob form.
pub fn seal_base64(key: &PayloadKey, plaintext: &[u8]) -> CryptoResult<String> {
    Ok(encrypt(key, plaintext)?.to_base64())
}

/// Decrypts a base64 blob back to plaintext bytes.
pub fn open_base64(key: &PayloadKey, encoded: &str) -> CryptoResult<Vec<u8>> {
    let blob = EncryptedBlob::from_base64(encoded)?;
    decrypt(key, &blob)
}
