//! Core type definitions for the Keygate license engine.
//!
//! This crate holds the shared data model:
//! - [`LicenseRecord`] — the single source of truth for a license session
//! - [`LicenseStatus`] — the externally visible enforcement state
//! - Seat and token projections ([`SeatSnapshot`], [`PendingConsumption`])
//! - [`SessionConfig`] — the dependency-injected configuration surface
//! - [`SessionEvent`] — events the engine publishes to the host

mod config;
mod event;
mod record;

pub use config::SessionConfig;
pub use event::SessionEvent;
pub use record::{
    KickedNotice, LicenseRecord, LicenseStatus, PendingConsumption, SeatEntry, SeatSnapshot,
    SeatStatus,
};
