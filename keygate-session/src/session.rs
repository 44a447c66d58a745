//! The license session: lifecycle, state machine driving, heartbeat loop.
//!
//! A [`LicenseSession`] is explicitly constructed from a [`SessionConfig`]
//! plus injected transport and store handles — there is no ambient global
//! instance. All state flows through one [`LicenseRecord`], replaced
//! atomically on every verified server response or rebuilt from the
//! offline cache, and one resolved [`LicenseStatus`].
//!
//! Concurrency model: one operation of the activation/validation class at a
//! time (a `Mutex<()>` guard, heartbeat ticks skip when it is taken), and
//! at most one heartbeat task per session — starting a new one stops any
//! prior one.

use crate::clock::{SecureClock, SystemTimeSource, TimeSource};
use crate::device::DeviceFingerprint;
use crate::envelope::Envelope;
use crate::error::{EngineError, EngineResult};
use crate::ns::Namespace;
use crate::status::{resolve, Resolution, StatusSignals};
use crate::transport::Transport;
use keygate_crypto::PayloadKey;
use keygate_store::{Loaded, StateStore, StateStoreExt};
use keygate_types::{KickedNotice, LicenseRecord, LicenseStatus, SessionConfig, SessionEvent};
use serde_json::{json, Value};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as OpMutex, RwLock};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub(crate) struct EngineState {
    pub record: Option<LicenseRecord>,
    pub status: LicenseStatus,
    pub online: bool,
    pub clock_tampered: bool,
    pub storage_tampered: bool,
}

pub(crate) struct SessionInner {
    pub config: SessionConfig,
    pub envelope: Envelope,
    pub store: Arc<dyn StateStore>,
    pub clock: SecureClock,
    pub ns: Namespace,
    pub device_id: String,
    pub state: RwLock<EngineState>,
    /// Guard for the activation/validation operation class.
    pub op_guard: OpMutex<()>,
    /// Single-flight guard for pending-consumption sync.
    pub sync_in_flight: AtomicBool,
    /// Serializes every load-modify-write of the pending-consumption queue.
    pub pending_guard: OpMutex<()>,
    heartbeat_stop: StdMutex<Option<watch::Sender<bool>>>,
    events: broadcast::Sender<SessionEvent>,
}

/// A license session bound to one project and one device.
#[derive(Clone)]
pub struct LicenseSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl LicenseSession {
    /// Creates a session with the real system clock.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self::with_time_source(config, transport, store, Arc::new(SystemTimeSource))
    }

    /// Creates a session with an injected time source.
    pub fn with_time_source(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let ns = Namespace::new(&config.project_id);
        let device_id = DeviceFingerprint::generate().id().to_string();
        let payload_key = PayloadKey::from_bytes(config.encryption_key);

        let envelope = Envelope::new(
            transport,
            store.clone(),
            payload_key,
            config.verifying_key,
            device_id.clone(),
            ns.nonce(),
        );
        let clock = SecureClock::new(store.clone(), ns.watermark(), time);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                config,
                envelope,
                store,
                clock,
                ns,
                device_id,
                state: RwLock::new(EngineState {
                    record: None,
                    status: LicenseStatus::Unauthenticated,
                    online: true,
                    clock_tampered: false,
                    storage_tampered: false,
                }),
                op_guard: OpMutex::new(()),
                sync_in_flight: AtomicBool::new(false),
                pending_guard: OpMutex::new(()),
                heartbeat_stop: StdMutex::new(None),
                events,
            }),
        }
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// This device's fingerprint, as sent on the wire.
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// The currently resolved status.
    pub async fn status(&self) -> LicenseStatus {
        self.inner.state.read().await.status
    }

    /// The current license record, if any.
    pub async fn record(&self) -> Option<LicenseRecord> {
        self.inner.state.read().await.record.clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Starts the session: loads cached state and, when configured,
    /// validates it against the authority.
    pub async fn start(&self) -> EngineResult<LicenseStatus> {
        match self.inner.store.get_json::<String>(&self.inner.ns.license_key())? {
            Loaded::Absent => {
                self.set_status(LicenseStatus::Unauthenticated).await;
                Ok(LicenseStatus::Unauthenticated)
            }
            Loaded::Tampered => self.enter_tampered().await,
            Loaded::Value(_) => {
                if self.inner.config.auto_validate_on_start {
                    self.validate().await
                } else {
                    let _guard = self.inner.op_guard.lock().await;
                    self.resolve_from_cache().await
                }
            }
        }
    }

    /// Activates a license key, registering this device with the authority.
    pub async fn activate(&self, key: &str) -> EngineResult<LicenseStatus> {
        let _guard = self.inner.op_guard.lock().await;
        self.activate_locked(key).await
    }

    async fn activate_locked(&self, key: &str) -> EngineResult<LicenseStatus> {
        info!(project = %self.inner.config.project_id, "activating license");
        let payload = json!({
            "action": "activate",
            "licenseKey": key,
            "nickname": self.inner.config.device_nickname,
            "clientVersion": self.inner.config.client_version,
        });

        let reply = match self.inner.envelope.send("activate", payload, false).await {
            Ok(reply) => reply,
            Err(EngineError::Network(e)) => {
                // Activation needs the authority; there is no offline
                // fallback before a first confirmed sync of this key.
                self.inner.state.write().await.online = false;
                return Err(EngineError::Network(e));
            }
            Err(e) => return self.handle_server_failure(e).await,
        };
        self.inner.state.write().await.online = true;

        let record = parse_license(&reply.data)?;
        if !record.device_authorized(&self.inner.device_id) {
            self.clear_cache()?;
            self.set_status(LicenseStatus::Unauthenticated).await;
            return Err(EngineError::DeviceNotAuthorized);
        }

        self.inner
            .store
            .put_json(&self.inner.ns.license_key(), &key.to_string())?;
        self.apply_record(record).await
    }

    /// Re-checks the cached license key without re-registering the device.
    pub async fn validate(&self) -> EngineResult<LicenseStatus> {
        let _guard = self.inner.op_guard.lock().await;
        self.validate_locked("validate", None, true).await
    }

    pub(crate) async fn validate_locked(
        &self,
        endpoint: &'static str,
        claim_seat: Option<bool>,
        allow_recovery: bool,
    ) -> EngineResult<LicenseStatus> {
        let key = match self.cached_license_key() {
            Ok(Some(key)) => key,
            Ok(None) => return Err(EngineError::NotActivated),
            Err(EngineError::StorageTampered) => return self.enter_tampered().await,
            Err(e) => return Err(e),
        };

        // A kicked device never re-claims a seat implicitly; that takes an
        // explicit reactivate() call.
        let claim_seat = match claim_seat {
            Some(explicit) => explicit,
            None => self.status().await != LicenseStatus::Kicked,
        };

        let payload = json!({
            "action": endpoint,
            "licenseKey": key,
            "claimSeat": claim_seat,
            "clientVersion": self.inner.config.client_version,
        });

        match self.inner.envelope.send(endpoint, payload, false).await {
            Ok(reply) => {
                self.inner.state.write().await.online = true;
                let record = parse_license(&reply.data)?;
                let status = self.apply_record(record).await?;
                if let Err(e) = self.sync_pending().await {
                    warn!("opportunistic pending sync failed: {e}");
                }
                Ok(status)
            }
            Err(EngineError::Network(e)) => {
                debug!("validation unreachable ({e}), evaluating offline grace");
                self.inner.state.write().await.online = false;
                self.resolve_from_cache().await
            }
            Err(EngineError::NonceDesync) if allow_recovery => {
                info!("nonce chain out of sync, recovering via re-activation");
                self.inner.envelope.reset_nonce()?;
                self.activate_locked(&key).await
            }
            Err(e) => self.handle_server_failure(e).await,
        }
    }

    /// Verifies a locally supplied signed license blob with no network
    /// round trip, then checks expiry against the secure clock.
    pub async fn activate_offline(&self, signed_blob: &str) -> EngineResult<LicenseStatus> {
        let _guard = self.inner.op_guard.lock().await;

        let data = self.inner.envelope.verify_blob(signed_blob)?;
        let record = parse_license(&data)?;
        if !record.device_authorized(&self.inner.device_id) {
            return Err(EngineError::DeviceNotAuthorized);
        }

        info!(project = %self.inner.config.project_id, "license activated offline");
        self.inner
            .store
            .put_json(&self.inner.ns.license_key(), &record.key)?;
        self.apply_record(record).await
    }

    /// Signs out: notifies the authority, clears all cached state.
    pub async fn sign_out(&self) -> EngineResult<()> {
        let _guard = self.inner.op_guard.lock().await;
        self.stop_heartbeat();

        if let Ok(Some(key)) = self.cached_license_key() {
            let payload = json!({"action": "deactivate", "licenseKey": key});
            if let Err(e) = self.inner.envelope.send("deactivate", payload, false).await {
                debug!("deactivate notification failed: {e}");
            }
        }

        self.clear_cache()?;
        self.inner.state.write().await.record = None;
        self.set_status(LicenseStatus::Unauthenticated).await;
        Ok(())
    }

    // ── Host lifecycle events ────────────────────────────────────

    /// The host moved to the background: the heartbeat is suspended, not
    /// merely slowed.
    pub fn on_suspend(&self) {
        debug!("host suspended, stopping heartbeat");
        self.stop_heartbeat();
    }

    /// The host returned to the foreground: validate immediately; a
    /// successful validation restarts the heartbeat.
    pub fn on_resume(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.validate().await {
                warn!("post-resume validation failed: {e}");
            }
        });
    }

    /// The host is quitting: fire-and-forget deactivate. The response may
    /// never arrive, so the nonce chain is left untouched.
    pub fn on_shutdown(&self) {
        self.stop_heartbeat();
        let session = self.clone();
        tokio::spawn(async move {
            let Ok(Some(key)) = session.cached_license_key() else {
                return;
            };
            let payload = json!({"action": "deactivate", "licenseKey": key});
            let _ = session.inner.envelope.send("deactivate", payload, true).await;
        });
    }

    /// The host reports a connectivity change. A regain triggers an
    /// immediate validation and pending-consumption sync.
    pub async fn on_connectivity(&self, online: bool) {
        let was_online = {
            let mut st = self.inner.state.write().await;
            std::mem::replace(&mut st.online, online)
        };
        if online && !was_online {
            info!("connectivity regained");
            let session = self.clone();
            tokio::spawn(async move {
                if let Err(e) = session.validate().await {
                    warn!("post-reconnect validation failed: {e}");
                }
            });
        }
    }

    // ── Heartbeat ────────────────────────────────────────────────

    pub(crate) fn start_heartbeat(&self) {
        let mut slot = self.inner.heartbeat_stop.lock().unwrap();
        if let Some(tx) = slot.as_ref() {
            if !tx.is_closed() {
                return; // already running
            }
        }
        let (tx, mut rx) = watch::channel(false);
        *slot = Some(tx);
        drop(slot);

        debug!("heartbeat started");
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                let interval = session.heartbeat_interval().await;
                tokio::select! {
                    _ = rx.changed() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                if *rx.borrow() {
                    break;
                }
                match session.heartbeat_tick().await {
                    Ok(status) if heartbeat_should_stop(status) => {
                        debug!(?status, "heartbeat stopping");
                        break;
                    }
                    Ok(_) => {}
                    Err(EngineError::Terminated) => break,
                    Err(e) => warn!("heartbeat validation failed: {e}"),
                }
            }
        });
    }

    pub(crate) fn stop_heartbeat(&self) {
        if let Some(tx) = self.inner.heartbeat_stop.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }

    async fn heartbeat_tick(&self) -> EngineResult<LicenseStatus> {
        // Another operation of the same class is in flight; skip this tick.
        let Ok(_guard) = self.inner.op_guard.try_lock() else {
            return Ok(self.status().await);
        };
        self.validate_locked("heartbeat", None, true).await
    }

    async fn heartbeat_interval(&self) -> Duration {
        let st = self.inner.state.read().await;
        let secs = st
            .record
            .as_ref()
            .and_then(|r| r.heartbeat_interval_seconds)
            .unwrap_or(self.inner.config.heartbeat_interval_secs);
        Duration::from_secs(secs.max(1))
    }

    // ── State application ────────────────────────────────────────

    /// Applies a server-confirmed record: persists it, resolves the status
    /// and drives the side effects. The record replaces the previous one
    /// wholesale.
    pub(crate) async fn apply_record(
        &self,
        record: LicenseRecord,
    ) -> EngineResult<LicenseStatus> {
        let (now, rollback) = self.inner.clock.effective_time()?;
        if rollback {
            warn!("clock rollback detected");
            self.inner.state.write().await.clock_tampered = true;
        }

        self.inner.store.put_json(&self.inner.ns.snapshot(), &record)?;
        self.inner.store.put_json(&self.inner.ns.last_sync(), &now)?;

        let signals = {
            let st = self.inner.state.read().await;
            StatusSignals {
                clock_tampered: st.clock_tampered || rollback,
                storage_tampered: st.storage_tampered,
                online: true,
            }
        };
        let resolution = resolve(&record, &signals, now, Some(now));
        if resolution.unrecognized_status {
            warn!(status = %record.status, "unrecognized server status, defaulting to active");
        }

        let kicked_notice = record.kicked_notice.clone();
        self.inner.state.write().await.record = Some(record);
        self.finish_resolution(resolution, kicked_notice).await
    }

    /// Resolves status from the offline cache, applying the grace rule.
    async fn resolve_from_cache(&self) -> EngineResult<LicenseStatus> {
        let (now, rollback) = self.inner.clock.effective_time()?;
        if rollback {
            warn!("clock rollback detected");
            self.inner.state.write().await.clock_tampered = true;
        }

        let mut storage_tampered = false;
        let record = match self.inner.state.read().await.record.clone() {
            Some(record) => Some(record),
            None => match self
                .inner
                .store
                .get_json::<LicenseRecord>(&self.inner.ns.snapshot())?
            {
                Loaded::Value(record) => Some(record),
                Loaded::Absent => None,
                Loaded::Tampered => {
                    storage_tampered = true;
                    None
                }
            },
        };
        let last_sync = match self.inner.store.get_json::<i64>(&self.inner.ns.last_sync())? {
            Loaded::Value(ts) => Some(ts),
            Loaded::Absent => None,
            Loaded::Tampered => {
                storage_tampered = true;
                None
            }
        };
        if storage_tampered {
            self.inner.state.write().await.storage_tampered = true;
        }

        let signals = {
            let st = self.inner.state.read().await;
            StatusSignals {
                clock_tampered: st.clock_tampered,
                storage_tampered: st.storage_tampered,
                online: false,
            }
        };

        let Some(record) = record else {
            if signals.clock_tampered || signals.storage_tampered {
                return self.enter_tampered().await;
            }
            self.set_status(LicenseStatus::Unauthenticated).await;
            return Ok(LicenseStatus::Unauthenticated);
        };

        let resolution = resolve(&record, &signals, now, last_sync);
        let kicked_notice = record.kicked_notice.clone();
        self.inner.state.write().await.record = Some(record);
        self.finish_resolution(resolution, kicked_notice).await
    }

    /// Drives side effects for a freshly resolved status.
    async fn finish_resolution(
        &self,
        resolution: Resolution,
        kicked_notice: Option<KickedNotice>,
    ) -> EngineResult<LicenseStatus> {
        let previous = self.status().await;
        match resolution.status {
            LicenseStatus::Tampered => return self.enter_tampered().await,
            LicenseStatus::Terminated => {
                self.fatal_terminate().await?;
                return Err(EngineError::Terminated);
            }
            LicenseStatus::Kicked => {
                // No silent seat re-claim: the loop stops here and stays
                // stopped until an explicit reactivate().
                self.stop_heartbeat();
                let notice = kicked_notice.unwrap_or(KickedNotice {
                    by_device_id: String::new(),
                    by_nickname: None,
                    timestamp: 0,
                    reason: None,
                });
                self.emit(SessionEvent::Kicked { notice });
            }
            LicenseStatus::GracePeriod => {
                let hours_remaining = resolution.grace_hours_remaining.unwrap_or(0);
                self.emit(SessionEvent::GraceWarning { hours_remaining });
            }
            LicenseStatus::ConnectionRequired => {
                if previous != LicenseStatus::ConnectionRequired {
                    // Auditable: offline grace exhausted or disabled.
                    warn!(project = %self.inner.config.project_id,
                        "offline grace exhausted, access blocked until reconnect");
                }
            }
            LicenseStatus::Active => self.start_heartbeat(),
            LicenseStatus::Suspended | LicenseStatus::Revoked => self.stop_heartbeat(),
            _ => {}
        }
        self.set_status(resolution.status).await;
        Ok(resolution.status)
    }

    /// Maps verified server-reported failures to state transitions.
    async fn handle_server_failure(&self, error: EngineError) -> EngineResult<LicenseStatus> {
        match error {
            EngineError::Terminated => {
                self.fatal_terminate().await?;
                Err(EngineError::Terminated)
            }
            EngineError::DeviceNotAuthorized => {
                self.clear_cache()?;
                self.inner.state.write().await.record = None;
                self.set_status(LicenseStatus::Unauthenticated).await;
                Err(EngineError::DeviceNotAuthorized)
            }
            EngineError::Suspended => {
                self.stop_heartbeat();
                self.set_status(LicenseStatus::Suspended).await;
                Ok(LicenseStatus::Suspended)
            }
            EngineError::Revoked => {
                self.stop_heartbeat();
                self.set_status(LicenseStatus::Revoked).await;
                Ok(LicenseStatus::Revoked)
            }
            EngineError::Expired => {
                self.set_status(LicenseStatus::Expired).await;
                Ok(LicenseStatus::Expired)
            }
            other => Err(other),
        }
    }

    /// Enters the tampered state: cache cleared, re-activation required.
    async fn enter_tampered(&self) -> EngineResult<LicenseStatus> {
        warn!(project = %self.inner.config.project_id,
            "tampering detected, clearing cache");
        self.stop_heartbeat();
        self.clear_cache()?;
        {
            let mut st = self.inner.state.write().await;
            st.record = None;
            // The evidence is gone with the cache; a fresh activation may
            // succeed. Clock rollback re-detects from the watermark.
            st.clock_tampered = false;
            st.storage_tampered = false;
        }
        self.set_status(LicenseStatus::Tampered).await;
        Ok(LicenseStatus::Tampered)
    }

    /// Fatal authority directive: clear everything and notify the host.
    async fn fatal_terminate(&self) -> EngineResult<()> {
        warn!(project = %self.inner.config.project_id, "license terminated by authority");
        self.stop_heartbeat();
        self.clear_cache()?;
        self.inner.state.write().await.record = None;
        self.set_status(LicenseStatus::Terminated).await;
        self.emit(SessionEvent::Terminated);
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    pub(crate) fn cached_license_key(&self) -> EngineResult<Option<String>> {
        match self
            .inner
            .store
            .get_json::<String>(&self.inner.ns.license_key())?
        {
            Loaded::Value(key) => Ok(Some(key)),
            Loaded::Absent => Ok(None),
            Loaded::Tampered => Err(EngineError::StorageTampered),
        }
    }

    /// Clears cached license state. The clock watermark survives so a
    /// rollback cannot be laundered through a cache reset.
    pub(crate) fn clear_cache(&self) -> EngineResult<()> {
        let ns = &self.inner.ns;
        for key in [
            ns.license_key(),
            ns.snapshot(),
            ns.nonce(),
            ns.last_sync(),
            ns.pending(),
        ] {
            self.inner.store.delete(&key)?;
        }
        Ok(())
    }

    pub(crate) async fn set_status(&self, status: LicenseStatus) {
        let changed = {
            let mut st = self.inner.state.write().await;
            if st.status == status {
                false
            } else {
                st.status = status;
                true
            }
        };
        if changed {
            info!(?status, "license status changed");
            self.emit(SessionEvent::StatusChanged { status });
            if status == LicenseStatus::ConnectionRequired {
                self.emit(SessionEvent::ConnectionRequired);
            }
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn heartbeat_should_stop(status: LicenseStatus) -> bool {
    matches!(
        status,
        LicenseStatus::Kicked
            | LicenseStatus::Terminated
            | LicenseStatus::Tampered
            | LicenseStatus::Suspended
            | LicenseStatus::Revoked
            | LicenseStatus::Unauthenticated
    )
}

/// Extracts the license record from a verified reply payload.
pub(crate) fn parse_license(data: &Value) -> EngineResult<LicenseRecord> {
    let license = data
        .get("license")
        .cloned()
        .ok_or_else(|| EngineError::Parse("response has no license object".to_string()))?;
    serde_json::from_value(license).map_err(|e| EngineError::Parse(e.to_string()))
}
