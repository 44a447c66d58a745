//! In-memory state store for tests.
//!
//! Same sealing and marker scheme as [`FileStore`](crate::FileStore), plus
//! hooks to inject tampering.

use crate::error::{StoreError, StoreResult};
use crate::mark::compute_marker;
use crate::store::{Loaded, StateStore};
use keygate_crypto::cipher::{open_base64, seal_base64};
use keygate_crypto::PayloadKey;
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    sealed: String,
    marker: Option<String>,
}

/// A state store backed by a hash map.
pub struct MemoryStore {
    key: PayloadKey,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store sealing with `key`.
    #[must_use]
    pub fn new(key: PayloadKey) -> Self {
        Self {
            key,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrites an entry's sealed bytes without refreshing its marker,
    /// simulating on-disk modification by an attacker.
    pub fn corrupt_value(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.sealed = format!("{}AAAA", entry.sealed);
        }
    }

    /// Removes an entry's marker, simulating marker deletion.
    pub fn drop_marker(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.marker = None;
        }
    }

    /// Lists the keys currently present under a prefix.
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl StateStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let sealed = seal_base64(&self.key, value).map_err(|e| StoreError::Crypto(e.to_string()))?;
        let marker = compute_marker(&self.key, key, &sealed);
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                sealed,
                marker: Some(marker),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Loaded<Vec<u8>>> {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(key) else {
            return Ok(Loaded::Absent);
        };

        let expected = compute_marker(&self.key, key, &entry.sealed);
        if entry.marker.as_deref() != Some(expected.as_str()) {
            return Ok(Loaded::Tampered);
        }

        match open_base64(&self.key, &entry.sealed) {
            Ok(plaintext) => Ok(Loaded::Value(plaintext)),
            Err(_) => Ok(Loaded::Tampered),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn clear(&self, prefix: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
