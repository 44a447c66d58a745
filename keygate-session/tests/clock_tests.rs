//! Secure clock and tamper detection tests.

mod common;

use common::*;
use keygate_session::{LicenseStatus, SecureClock};
use keygate_store::{MemoryStore, StateStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;

// ── Watermark behavior ───────────────────────────────────────────

fn clock_fixture(start: i64) -> (SecureClock, Arc<ManualClock>, Arc<MemoryStore>) {
    let time = ManualClock::at(start);
    let store = Arc::new(MemoryStore::new(payload_key()));
    let clock = SecureClock::new(store.clone(), "t/clock_watermark".to_string(), time.clone());
    (clock, time, store)
}

#[test]
fn forward_time_advances_the_watermark() {
    let (clock, time, _) = clock_fixture(START_TIME);

    assert_eq!(clock.effective_time().unwrap(), (START_TIME, false));
    time.advance(100);
    assert_eq!(clock.effective_time().unwrap(), (START_TIME + 100, false));
}

#[test]
fn rollback_reports_the_watermark_and_flags() {
    let (clock, time, _) = clock_fixture(START_TIME);
    clock.effective_time().unwrap();

    time.set(START_TIME - 7200);
    let (effective, rollback) = clock.effective_time().unwrap();
    assert!(rollback);
    assert_eq!(effective, START_TIME);

    // The watermark did not move backward.
    time.set(START_TIME - 1);
    assert_eq!(clock.effective_time().unwrap(), (START_TIME, true));
}

#[test]
fn watermark_survives_across_clock_instances() {
    let time = ManualClock::at(START_TIME);
    let store = Arc::new(MemoryStore::new(payload_key()));

    let clock = SecureClock::new(store.clone(), "t/clock_watermark".to_string(), time.clone());
    clock.effective_time().unwrap();
    drop(clock);

    time.set(START_TIME - 50);
    let clock = SecureClock::new(store, "t/clock_watermark".to_string(), time);
    assert_eq!(clock.effective_time().unwrap(), (START_TIME, true));
}

#[test]
fn tampered_watermark_entry_is_an_error() {
    let (clock, _, store) = clock_fixture(START_TIME);
    clock.effective_time().unwrap();

    store.corrupt_value("t/clock_watermark");
    assert!(clock.effective_time().is_err());
}

// ── Session response to tampering ────────────────────────────────

#[tokio::test]
async fn clock_rollback_forces_reactivation() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    h.clock.set(START_TIME - 86_400);
    let status = h.session.validate().await.unwrap();
    assert_eq!(status, LicenseStatus::Tampered);
    assert!(status.requires_reactivation());
    assert!(h.session.record().await.is_none());
}

#[tokio::test]
async fn rollback_observed_during_consume_sticks() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    h.transport.set_offline(true);
    h.session.validate().await.unwrap();

    // Roll back, consume, then let the clock recover: the rollback must
    // still surface at the next resolution.
    h.clock.set(START_TIME - 3_600);
    h.session.consume("render", 1).await.unwrap();
    h.clock.set(START_TIME + 60);

    assert_eq!(
        h.session.validate().await.unwrap(),
        LicenseStatus::Tampered
    );
}

#[tokio::test]
async fn rollback_does_not_extend_offline_grace() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    // Go offline, burn most of the grace window, then roll the clock back
    // trying to win it back.
    h.transport.set_offline(true);
    h.clock.advance(23 * 3600);
    assert_eq!(
        h.session.validate().await.unwrap(),
        LicenseStatus::GracePeriod
    );

    h.clock.set(START_TIME);
    assert_eq!(
        h.session.validate().await.unwrap(),
        LicenseStatus::Tampered
    );
}

#[tokio::test]
async fn reactivation_after_rollback_succeeds_once_time_recovers() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    h.clock.set(START_TIME - 3600);
    assert_eq!(
        h.session.validate().await.unwrap(),
        LicenseStatus::Tampered
    );

    // Clock restored past the watermark; a fresh activation works.
    h.clock.set(START_TIME + 10);
    assert_eq!(
        h.session.activate("TEST-0001-0001").await.unwrap(),
        LicenseStatus::Active
    );
}

#[tokio::test]
async fn tampered_snapshot_clears_the_cache() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    // Edit the cached snapshot behind the engine's back, then start a new
    // session over the same store while offline.
    h.store.corrupt_value("testproj/snapshot");
    h.transport.set_offline(true);
    let session2 = keygate_session::LicenseSession::with_time_source(
        test_config(),
        h.transport.clone(),
        h.store.clone(),
        h.clock.clone(),
    );
    let status = session2.start().await.unwrap();
    assert_eq!(status, LicenseStatus::Tampered);
    assert!(matches!(
        h.store.get("testproj/snapshot").unwrap(),
        keygate_store::Loaded::Absent
    ));
}

#[tokio::test]
async fn tampered_license_key_forces_reactivation() {
    let h = harness();
    h.session.activate("TEST-0001-0001").await.unwrap();

    h.store.corrupt_value("testproj/license_key");
    let status = h.session.validate().await.unwrap();
    assert_eq!(status, LicenseStatus::Tampered);
}
