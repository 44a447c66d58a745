//! Seat coordination: roster queries, remote release, explicit re-claim.

use crate::error::{EngineError, EngineResult};
use crate::session::LicenseSession;
use keygate_types::{LicenseStatus, SeatSnapshot};
use serde_json::json;
use tracing::info;

impl LicenseSession {
    /// Fetches the current seat roster from the authority.
    pub async fn active_seats(&self) -> EngineResult<SeatSnapshot> {
        let key = self
            .cached_license_key()?
            .ok_or(EngineError::NotActivated)?;
        if let Some(record) = self.record().await {
            if !record.seats_enabled {
                return Err(EngineError::FeatureDisabled("seats"));
            }
        }

        let payload = json!({"action": "seats", "licenseKey": key});
        let reply = self.inner.envelope.send("seats", payload, false).await?;
        let seats = reply
            .data
            .get("seats")
            .cloned()
            .ok_or_else(|| EngineError::Parse("response has no seat roster".to_string()))?;
        serde_json::from_value(seats).map_err(|e| EngineError::Parse(e.to_string()))
    }

    /// Asks the authority to release another device's seat. With
    /// `claim_for_self` the freed seat is claimed in the same operation.
    /// A release inside the cooldown window surfaces as
    /// [`EngineError::SeatReleaseCooldown`].
    pub async fn release_seat(
        &self,
        target_device_id: &str,
        claim_for_self: bool,
    ) -> EngineResult<LicenseStatus> {
        let _guard = self.inner.op_guard.lock().await;
        let key = self
            .cached_license_key()?
            .ok_or(EngineError::NotActivated)?;

        let payload = json!({
            "action": "release_seat",
            "licenseKey": key,
            "targetDeviceId": target_device_id,
            "claimForSelf": claim_for_self,
        });
        self.inner
            .envelope
            .send("release-seat", payload, false)
            .await?;
        info!(target = target_device_id, "seat released");

        if claim_for_self {
            self.validate_locked("validate", Some(true), true).await
        } else {
            Ok(self.status().await)
        }
    }

    /// Explicitly tries to claim a seat again after being kicked or left
    /// without one. The returned status tells whether the claim succeeded.
    pub async fn reactivate(&self) -> EngineResult<LicenseStatus> {
        let _guard = self.inner.op_guard.lock().await;
        info!("explicit seat re-claim requested");
        self.validate_locked("validate", Some(true), true).await
    }
}
