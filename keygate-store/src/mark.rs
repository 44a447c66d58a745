//! Integrity markers for protected entries.
//!
//! The marker is a keyed digest over the sealed value and its key name,
//! stored separately from the value itself. It attests to the payload; it
//! does not contain it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keygate_crypto::PayloadKey;
use sha2::{Digest, Sha256};

/// Computes the integrity marker for a sealed entry.
pub(crate) fn compute_marker(key: &PayloadKey, entry_key: &str, sealed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0x1f]);
    hasher.update(entry_key.as_bytes());
    hasher.update([0x1f]);
    hasher.update(sealed.as_bytes());
    BASE64.encode(hasher.finalize())
}
