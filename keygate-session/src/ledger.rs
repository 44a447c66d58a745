//! The token ledger: optimistic local decrements reconciled against the
//! authority.
//!
//! `consume` is the one place that mutates the license record outside a
//! verified server response. The decrement applies immediately so metered
//! features stay usable offline; every consumption either reaches the
//! authority right away or lands in a persisted FIFO queue that is synced
//! in order on the next opportunity. The server's record replaces the
//! local one wholesale on reconciliation, so local arithmetic can never
//! drift permanently.

use crate::error::{EngineError, EngineResult};
use crate::session::{parse_license, LicenseSession};
use keygate_store::{Loaded, StateStoreExt};
use keygate_types::{PendingConsumption, SessionEvent};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl LicenseSession {
    /// Consumes `amount` tokens for `action`, decrementing the local
    /// balance immediately. Returns the local balance after the decrement;
    /// a negative balance is a valid transient until the next sync.
    pub async fn consume(&self, action: &str, amount: i64) -> EngineResult<Option<i64>> {
        if amount <= 0 {
            return Err(EngineError::Parse(
                "consumption amount must be positive".to_string(),
            ));
        }

        let (online, remaining, key, snapshot) = {
            let mut st = self.inner.state.write().await;
            let record = st.record.as_mut().ok_or(EngineError::NotActivated)?;
            if !record.tokens_enabled {
                return Err(EngineError::FeatureDisabled("tokens"));
            }
            record.consume_local(amount);
            let remaining = record.tokens_remaining;
            let key = record.key.clone();
            let snapshot = record.clone();
            (st.online, remaining, key, snapshot)
        };

        self.inner
            .store
            .put_json(&self.inner.ns.snapshot(), &snapshot)?;
        self.emit(SessionEvent::TokensConsumed {
            action: action.to_string(),
            amount,
            remaining,
        });

        let (now, rollback) = self.inner.clock.effective_time()?;
        if rollback {
            warn!("clock rollback detected");
            self.inner.state.write().await.clock_tampered = true;
        }
        let entry = PendingConsumption {
            action: action.to_string(),
            amount,
            device_id: self.device_id().to_string(),
            timestamp: now,
        };

        if online {
            let session = self.clone();
            tokio::spawn(async move {
                session.push_consumption(key, entry).await;
            });
        } else {
            debug!(action, amount, "offline, queueing consumption");
            self.queue_pending(entry).await?;
        }
        Ok(remaining)
    }

    /// Reports one consumption to the authority; on network failure it
    /// joins the pending queue instead.
    async fn push_consumption(&self, key: String, entry: PendingConsumption) {
        let payload = json!({
            "action": "consume",
            "licenseKey": key,
            "consumption": entry,
        });
        match self.inner.envelope.send("consume", payload, false).await {
            Ok(reply) => match parse_license(&reply.data) {
                Ok(record) => {
                    if let Err(e) = self.apply_record(record).await {
                        warn!("applying consume response failed: {e}");
                    }
                }
                Err(e) => warn!("consume response unreadable: {e}"),
            },
            Err(EngineError::Network(e)) => {
                debug!("consume report unreachable ({e}), queueing");
                self.inner.state.write().await.online = false;
                if let Err(e) = self.queue_pending(entry).await {
                    warn!("queueing consumption failed: {e}");
                }
            }
            Err(e) => warn!("consume report rejected: {e}"),
        }
    }

    /// Syncs the pending-consumption queue as one ordered batch. At most
    /// one sync runs at a time; a second call while one is in flight is a
    /// no-op. Entries queued while the batch is in flight survive for the
    /// next sync.
    pub async fn sync_pending(&self) -> EngineResult<()> {
        if self.inner.sync_in_flight.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.sync_pending_locked().await;
        self.inner.sync_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_pending_locked(&self) -> EngineResult<()> {
        let batch = self.load_pending()?;
        if batch.is_empty() {
            return Ok(());
        }
        let key = self
            .cached_license_key()?
            .ok_or(EngineError::NotActivated)?;

        let payload = json!({
            "action": "consume_batch",
            "licenseKey": key,
            "consumptions": batch,
        });
        let reply = match self
            .inner
            .envelope
            .send("consume-batch", payload, false)
            .await
        {
            Ok(reply) => reply,
            Err(EngineError::Network(e)) => {
                debug!("pending sync unreachable ({e}), keeping queue");
                self.inner.state.write().await.online = false;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Remove exactly the synced batch; the queue is append-only, so
        // anything queued meanwhile sits after the batch prefix. The guard
        // keeps a concurrent append from interleaving with the rewrite.
        {
            let _pending = self.inner.pending_guard.lock().await;
            let mut queue = self.load_pending()?;
            queue.drain(..batch.len().min(queue.len()));
            self.inner.store.put_json(&self.inner.ns.pending(), &queue)?;
        }
        self.inner.state.write().await.online = true;
        info!(synced = batch.len(), "pending consumptions reconciled");

        let record = parse_license(&reply.data)?;
        self.apply_record(record).await?;
        Ok(())
    }

    async fn queue_pending(&self, entry: PendingConsumption) -> EngineResult<()> {
        let _pending = self.inner.pending_guard.lock().await;
        let mut queue = self.load_pending()?;
        queue.push(entry);
        self.inner.store.put_json(&self.inner.ns.pending(), &queue)?;
        Ok(())
    }

    fn load_pending(&self) -> EngineResult<Vec<PendingConsumption>> {
        match self
            .inner
            .store
            .get_json::<Vec<PendingConsumption>>(&self.inner.ns.pending())?
        {
            Loaded::Value(queue) => Ok(queue),
            Loaded::Absent => Ok(Vec::new()),
            Loaded::Tampered => Err(EngineError::StorageTampered),
        }
    }
}
