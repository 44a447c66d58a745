//! Client-side licensing engine for Keygate.
//!
//! Enforces entitlements on the device: seat occupancy, metered token
//! consumption, offline grace, and tamper response, all driven by
//! cryptographically verified state from the licensing authority.
//!
//! # Architecture
//!
//! - **Envelope**: Encrypts every request, verifies every response
//!   signature, and advances the replay-protection nonce chain
//! - **Session**: Owns the license record, resolves the status, runs the
//!   heartbeat loop, and emits events to the host
//! - **Ledger**: Optimistic token decrements with an ordered offline queue
//! - **Seats**: Roster queries, remote release, explicit re-claim
//! - **Clock**: Monotonic watermark that detects wall-clock rollback
//!
//! The engine trusts only two things: the authority's Ed25519 signature
//! and its own sealed local cache. Everything else — the wall clock, the
//! filesystem, the transport — is treated as hostile.
//!
//! # Example
//!
//! ```no_run
//! use keygate_session::{LicenseSession, SessionConfig};
//! use keygate_session::transport::mock::MockTransport;
//! use keygate_store::MemoryStore;
//! use keygate_crypto::PayloadKey;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), keygate_session::EngineError> {
//! let config = SessionConfig::new("my-app", [0u8; 32], [0u8; 32]);
//! let store = Arc::new(MemoryStore::new(PayloadKey::from_bytes([0u8; 32])));
//! let transport = Arc::new(MockTransport::new(|_, _| unimplemented!()));
//!
//! let session = LicenseSession::new(config, transport, store);
//! let status = session.activate("XXXX-XXXX-XXXX").await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod device;
mod envelope;
mod error;
#[cfg(feature = "online")]
mod http;
mod ledger;
mod ns;
mod seats;
mod session;
mod status;
pub mod transport;

pub use clock::{SecureClock, SystemTimeSource, TimeSource};
pub use device::DeviceFingerprint;
pub use envelope::ServerReply;
pub use error::{EngineError, EngineResult};
#[cfg(feature = "online")]
pub use http::HttpTransport;
pub use session::LicenseSession;
pub use status::{resolve, Resolution, StatusSignals};
pub use transport::Transport;

// Re-export the shared types hosts need to drive a session.
pub use keygate_types::{
    KickedNotice, LicenseRecord, LicenseStatus, PendingConsumption, SeatEntry, SeatSnapshot,
    SeatStatus, SessionConfig, SessionEvent,
};
