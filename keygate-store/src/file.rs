//! File-backed state store.
//!
//! One file per entry under a root directory, with the marker in a `.mark`
//! sibling. Values on disk are base64 ChaCha20-Poly1305 blobs, so the cache
//! is unreadable without the project key even before marker checks.

use crate::error::{StoreError, StoreResult};
use crate::mark::compute_marker;
use crate::store::{Loaded, StateStore};
use keygate_crypto::cipher::{open_base64, seal_base64};
use keygate_crypto::PayloadKey;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A state store persisting each entry as an encrypted file.
pub struct FileStore {
    root: PathBuf,
    key: PayloadKey,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, key: PayloadKey) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, key })
    }

    fn entry_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn marker_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".mark");
        path.with_file_name(name)
    }
}

impl StateStore for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let sealed = seal_base64(&self.key, value).map_err(|e| StoreError::Crypto(e.to_string()))?;
        let marker = compute_marker(&self.key, key, &sealed);
        // Marker first, value last: an interrupted new write reads back as
        // `Absent` instead of `Tampered`.
        write_via_rename(&Self::marker_path(&path), &marker)?;
        write_via_rename(&path, &sealed)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Loaded<Vec<u8>>> {
        let path = self.entry_path(key)?;
        let sealed = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::Absent),
            Err(e) => return Err(e.into()),
        };

        let expected = compute_marker(&self.key, key, &sealed);
        match fs::read_to_string(Self::marker_path(&path)) {
            Ok(actual) if actual == expected => {}
            Ok(_) => return Ok(Loaded::Tampered),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::Tampered),
            Err(e) => return Err(e.into()),
        }

        match open_base64(&self.key, &sealed) {
            Ok(plaintext) => Ok(Loaded::Value(plaintext)),
            Err(_) => Ok(Loaded::Tampered),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        remove_ignoring_missing(&path)?;
        remove_ignoring_missing(&Self::marker_path(&path))
    }

    fn clear(&self, prefix: &str) -> StoreResult<()> {
        validate_key(prefix)?;
        match fs::remove_dir_all(self.root.join(prefix)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes through a `.tmp` sibling and renames over the target, so a
/// partially written file can never be observed under the entry's name.
fn write_via_rename(path: &Path, contents: &str) -> StoreResult<()> {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    let tmp = path.with_file_name(name);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_ignoring_missing(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Keys are slash-separated path segments; nothing that could escape the
/// store root is accepted.
fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|seg| {
            seg.is_empty()
                || seg == "."
                || seg == ".."
                || seg.ends_with(".mark")
                || seg.ends_with(".tmp")
                || !seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
