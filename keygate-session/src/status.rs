//! License status resolution — a pure state machine, no I/O.
//!
//! Resolution priority, highest first: clock tampering, storage tampering,
//! explicit kicked / no-seat seat signals, the mapped server status string,
//! time-based expiry, the offline-grace rule, then `Active` as the default.
//! The default-to-active fallback for unrecognized server status strings is
//! inherited behavior; the caller logs the raw string when it happens.

use keygate_types::{LicenseRecord, LicenseStatus, SeatStatus};

/// Local signals feeding status resolution, alongside the record itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSignals {
    /// System clock observed behind the persisted watermark.
    pub clock_tampered: bool,
    /// A protected cache entry failed its integrity check.
    pub storage_tampered: bool,
    /// Whether the authority is currently reachable.
    pub online: bool,
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved status.
    pub status: LicenseStatus,
    /// Whole hours left in the grace window, when in `GracePeriod`.
    pub grace_hours_remaining: Option<u32>,
    /// True when the server status string was unrecognized and the
    /// default-to-active fallback applied.
    pub unrecognized_status: bool,
}

impl Resolution {
    fn plain(status: LicenseStatus) -> Self {
        Self {
            status,
            grace_hours_remaining: None,
            unrecognized_status: false,
        }
    }
}

/// Resolves the externally visible status for a license record.
///
/// `now` must come from the secure clock, and `last_sync` is the timestamp
/// of the last confirmed server sync.
#[must_use]
pub fn resolve(
    record: &LicenseRecord,
    signals: &StatusSignals,
    now: i64,
    last_sync: Option<i64>,
) -> Resolution {
    if signals.clock_tampered || signals.storage_tampered {
        return Resolution::plain(LicenseStatus::Tampered);
    }

    match record.seat_status {
        Some(SeatStatus::Kicked) => return Resolution::plain(LicenseStatus::Kicked),
        Some(SeatStatus::NoSeat) => return Resolution::plain(LicenseStatus::ValidNoSeat),
        _ => {}
    }

    let mapped = LicenseStatus::from_server(&record.status);
    match mapped {
        Some(LicenseStatus::Active) | None => {}
        Some(other) => return Resolution::plain(other),
    }

    if record.is_expired(now) {
        return Resolution::plain(LicenseStatus::Expired);
    }

    if !signals.online {
        return resolve_offline(record, now, last_sync, mapped.is_none());
    }

    Resolution {
        status: LicenseStatus::Active,
        grace_hours_remaining: None,
        unrecognized_status: mapped.is_none(),
    }
}

/// The offline-grace rule: with grace disabled (or zero hours) any loss of
/// connectivity blocks immediately; otherwise access continues until the
/// window since the last confirmed sync closes.
fn resolve_offline(
    record: &LicenseRecord,
    now: i64,
    last_sync: Option<i64>,
    unrecognized: bool,
) -> Resolution {
    let grace_hours = record.offline_grace_hours.unwrap_or(0);
    if !record.offline_enabled || grace_hours == 0 {
        return Resolution {
            status: LicenseStatus::ConnectionRequired,
            grace_hours_remaining: None,
            unrecognized_status: unrecognized,
        };
    }

    let Some(last_sync) = last_sync else {
        return Resolution {
            status: LicenseStatus::ConnectionRequired,
            grace_hours_remaining: None,
            unrecognized_status: unrecognized,
        };
    };

    let elapsed = now.saturating_sub(last_sync).max(0);
    let window = i64::from(grace_hours) * 3600;
    if elapsed <= window {
        Resolution {
            status: LicenseStatus::GracePeriod,
            grace_hours_remaining: Some(((window - elapsed) / 3600) as u32),
            unrecognized_status: unrecognized,
        }
    } else {
        Resolution {
            status: LicenseStatus::ConnectionRequired,
            grace_hours_remaining: None,
            unrecognized_status: unrecognized,
        }
    }
}
