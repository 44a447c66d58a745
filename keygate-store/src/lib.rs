//! Encrypted, tamper-evident state store for Keygate.
//!
//! Persisted license state (keys, cached snapshots, nonces, watermarks,
//! pending consumptions) goes through the [`StateStore`] trait. Values are
//! sealed with the project's symmetric key; an integrity marker is kept
//! separately beside each entry. Reads return a tri-state [`Loaded`]:
//! a missing entry is `Absent`, a marker mismatch or decryption failure is
//! `Tampered`, and only a fully verified entry yields its value. The state
//! machine treats `Tampered` with the highest priority.

mod error;
mod file;
mod mark;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{Loaded, StateStore, StateStoreExt};
