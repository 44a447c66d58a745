//! The store trait and the tri-state read result.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Result of reading a protected entry.
///
/// `Absent` (never written, or deliberately cleared) and `Tampered`
/// (integrity marker missing/mismatched, or the value fails to decrypt)
/// are distinct conditions: the first is ordinary, the second forces the
/// session into the `Tampered` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    /// The entry was present and its integrity verified.
    Value(T),
    /// No entry under this key.
    Absent,
    /// The entry exists but failed its integrity check.
    Tampered,
}

/// An encrypted, tamper-evident key-value store.
///
/// Keys are slash-separated paths (`<project>/<entry>`); the engine
/// namespaces everything under its project identifier. Implementations
/// overwrite by key; no cross-key transactions are required.
pub trait StateStore: Send + Sync {
    /// Seals and writes a value, replacing any previous entry.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Reads and verifies an entry.
    fn get(&self, key: &str) -> StoreResult<Loaded<Vec<u8>>>;

    /// Removes an entry and its marker. Removing a missing entry is a no-op.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Removes every entry under a namespace prefix.
    fn clear(&self, prefix: &str) -> StoreResult<()>;
}

/// Typed convenience methods over any [`StateStore`].
pub trait StateStoreExt: StateStore {
    /// Serializes a value as JSON and seals it under `key`.
    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes)
    }

    /// Reads and deserializes an entry. A verified entry that no longer
    /// parses is reported as `Tampered` — the marker only attests to
    /// ciphertext the store itself wrote.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Loaded<T>> {
        Ok(match self.get(key)? {
            Loaded::Value(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Loaded::Value(value),
                Err(_) => Loaded::Tampered,
            },
            Loaded::Absent => Loaded::Absent,
            Loaded::Tampered => Loaded::Tampered,
        })
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}
