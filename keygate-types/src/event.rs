//! Events the engine publishes to the host.
//!
//! The host subscribes to a broadcast channel and drains these; they replace
//! the multicast callbacks of older license SDKs. `Kicked` and a plain
//! no-seat `StatusChanged` stay distinct events.

use crate::record::{KickedNotice, LicenseStatus};
use serde::{Deserialize, Serialize};

/// An event published by the license session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The resolved license status changed.
    StatusChanged {
        /// The new status.
        status: LicenseStatus,
    },
    /// This device lost its seat to another device's explicit release.
    Kicked {
        /// Details of the eviction.
        notice: KickedNotice,
    },
    /// Tokens were consumed (optimistically or server-confirmed).
    TokensConsumed {
        /// Application-defined action label.
        action: String,
        /// Tokens drawn.
        amount: i64,
        /// Balance after the consumption, if known.
        remaining: Option<i64>,
    },
    /// Offline inside the grace window; access continues with a warning.
    GraceWarning {
        /// Whole hours left before the grace window closes.
        hours_remaining: u32,
    },
    /// Offline grace exhausted (or disabled); access is blocked.
    ConnectionRequired,
    /// Fatal authority directive. The host is expected to shut down.
    Terminated,
}
