//! Canonical serialization and envelope cryptography for Keygate.
//!
//! Three concerns live here:
//! - [`canonical`] — deterministic, recursively key-sorted JSON used as the
//!   byte-exact input to signature verification
//! - [`cipher`] — ChaCha20-Poly1305 payload encryption with base64 blob
//!   encoding for the wire and the local cache
//! - [`signature`] — Ed25519 verification of authority responses
//!
//! Keys are zeroized on drop. Verification failures never expose partial
//! plaintext; callers get a typed [`CryptoError`] and nothing else.

pub mod canonical;
pub mod cipher;
mod error;
pub mod signature;

pub use canonical::{canonicalize, canonicalize_str};
pub use cipher::{EncryptedBlob, PayloadKey, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use signature::verify_signature;
