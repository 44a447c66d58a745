//! The license record and its projections.
//!
//! [`LicenseRecord`] is owned by the state machine and replaced atomically
//! on every verified server response. The one sanctioned partial mutation is
//! the token ledger's optimistic decrement ([`LicenseRecord::consume_local`]).
//!
//! All timestamps are seconds since the Unix epoch. Numeric entitlement
//! fields are `Option`: `None` means "not configured", which is distinct
//! from a configured zero.

use serde::{Deserialize, Serialize};

/// Externally visible license status, resolved by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// No license has been activated or validated in this session.
    Unauthenticated,
    /// License is valid and this device holds a seat.
    Active,
    /// License is valid but every seat is taken by another device.
    ValidNoSeat,
    /// This device's seat was released and claimed by another device.
    Kicked,
    /// License validity window has passed.
    Expired,
    /// Offline, but still inside the configured grace window.
    GracePeriod,
    /// Offline past the grace window, or offline with grace disabled.
    ConnectionRequired,
    /// Authority suspended the license; entitlements blocked.
    Suspended,
    /// Authority revoked the license; entitlements blocked.
    Revoked,
    /// Fatal authority directive; the host is expected to shut down.
    Terminated,
    /// Clock rollback or storage tampering detected.
    Tampered,
}

impl LicenseStatus {
    /// Maps an authority status string to a status, or `None` when the
    /// string is unrecognized. The caller decides the fallback policy.
    #[must_use]
    pub fn from_server(status: &str) -> Option<Self> {
        match status.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "EXPIRED" => Some(Self::Expired),
            "SUSPENDED" => Some(Self::Suspended),
            "REVOKED" => Some(Self::Revoked),
            "TERMINATED" => Some(Self::Terminated),
            "VALID_NO_SEAT" => Some(Self::ValidNoSeat),
            _ => None,
        }
    }

    /// Returns true if entitlement checks should pass in this status.
    #[must_use]
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::GracePeriod)
    }

    /// Returns true if the status is a fatal authority directive.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true if recovery requires a fresh activation.
    #[must_use]
    pub fn requires_reactivation(&self) -> bool {
        matches!(self, Self::Tampered | Self::Kicked | Self::Unauthenticated)
    }
}

/// Seat condition the authority reports for this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    /// This device holds a seat.
    Active,
    /// This device never obtained a seat.
    NoSeat,
    /// This device held a seat and another device's release evicted it.
    Kicked,
}

/// Notice attached when this device lost a previously held seat.
///
/// Distinct from never having obtained a seat: a kicked device must not
/// silently re-claim on its next heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickedNotice {
    /// Device that released this device's seat.
    pub by_device_id: String,
    /// Human-readable nickname of that device, if known.
    #[serde(default)]
    pub by_nickname: Option<String>,
    /// When the eviction happened (epoch seconds).
    pub timestamp: i64,
    /// Optional authority-supplied reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// The license record — single source of truth for a session.
///
/// Field names match the authority's wire form (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// The license key this record was issued for.
    pub key: String,
    /// Project identifier the key belongs to.
    pub project: String,
    /// Raw status string as reported by the authority.
    pub status: String,
    /// Start of the validity window (epoch seconds).
    #[serde(default)]
    pub valid_from: Option<i64>,
    /// End of the validity window (epoch seconds), `None` for perpetual.
    #[serde(default)]
    pub valid_until: Option<i64>,
    /// Seats currently claimed across all devices.
    #[serde(default)]
    pub active_seats: Option<u32>,
    /// Maximum concurrent seats this license permits.
    #[serde(default)]
    pub max_concurrent_seats: Option<u32>,
    /// Seat condition for this device.
    #[serde(default)]
    pub seat_status: Option<SeatStatus>,
    /// Total consumable tokens granted.
    #[serde(default)]
    pub tokens_limit: Option<i64>,
    /// Tokens consumed so far (authoritative count).
    #[serde(default)]
    pub tokens_consumed: Option<i64>,
    /// Tokens remaining. May be negative transiently while several offline
    /// devices reconcile against the same pool.
    #[serde(default)]
    pub tokens_remaining: Option<i64>,
    /// Whether seat enforcement applies to this license.
    #[serde(default)]
    pub seats_enabled: bool,
    /// Whether token metering applies to this license.
    #[serde(default)]
    pub tokens_enabled: bool,
    /// Whether offline grace is permitted at all.
    #[serde(default)]
    pub offline_enabled: bool,
    /// Grace window in hours after the last confirmed sync.
    #[serde(default)]
    pub offline_grace_hours: Option<u32>,
    /// Server-directed heartbeat interval; overrides the configured base.
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<u64>,
    /// Devices allowed to activate this license. Empty means unrestricted.
    #[serde(default)]
    pub authorized_devices: Vec<String>,
    /// Present only when this device was kicked.
    #[serde(default)]
    pub kicked_notice: Option<KickedNotice>,
}

impl LicenseRecord {
    /// Returns true if the validity window has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.valid_until, Some(until) if now >= until)
    }

    /// Returns true if `device_id` may activate this license.
    /// An empty authorization list means every device is allowed.
    #[must_use]
    pub fn device_authorized(&self, device_id: &str) -> bool {
        self.authorized_devices.is_empty()
            || self.authorized_devices.iter().any(|d| d == device_id)
    }

    /// Applies the ledger's optimistic local decrement.
    ///
    /// This is the single sanctioned partial mutation of a record; every
    /// other update replaces the record wholesale with server data. The
    /// resulting balance is a display convenience, never the truth.
    pub fn consume_local(&mut self, amount: i64) {
        self.tokens_consumed = Some(self.tokens_consumed.unwrap_or(0) + amount);
        if let Some(remaining) = self.tokens_remaining {
            self.tokens_remaining = Some(remaining - amount);
        } else if let Some(limit) = self.tokens_limit {
            self.tokens_remaining = Some(limit - self.tokens_consumed.unwrap_or(0));
        }
    }
}

/// One seat in a [`SeatSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatEntry {
    /// Device holding the seat.
    pub device_id: String,
    /// Human-readable device nickname, if the device reported one.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Last heartbeat from this device (epoch seconds).
    pub last_seen: i64,
    /// True when the entry describes the requesting device.
    #[serde(default)]
    pub is_self: bool,
}

/// Read-mostly projection of current seat usage, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatSnapshot {
    /// All currently claimed seats.
    pub seats: Vec<SeatEntry>,
    /// Maximum concurrent seats for the license.
    pub max_seats: u32,
    /// Seats currently claimed.
    pub active_seats: u32,
    /// Whether the authority currently permits a release call.
    #[serde(default)]
    pub can_release: bool,
}

/// A token consumption queued while offline, reconciled later in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConsumption {
    /// Application-defined action label.
    pub action: String,
    /// Tokens drawn by this action.
    pub amount: i64,
    /// Device that performed the action.
    pub device_id: String,
    /// When the action happened (epoch seconds).
    pub timestamp: i64,
}
