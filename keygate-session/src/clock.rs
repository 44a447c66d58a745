//! Secure clock with a persisted monotonic watermark.
//!
//! Every time-sensitive decision in the engine reads [`SecureClock::
//! effective_time`], never raw system time: rolling the clock backward can
//! then never extend a license or a grace window. System time behind the
//! watermark reports the watermark unchanged plus a rollback signal.

use crate::error::{EngineError, EngineResult};
use keygate_store::{Loaded, StateStore, StateStoreExt};
use std::sync::Arc;

/// Source of wall-clock time, pluggable for tests.
pub trait TimeSource: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Monotonic time watermark resistant to rollback.
pub struct SecureClock {
    store: Arc<dyn StateStore>,
    watermark_key: String,
    time: Arc<dyn TimeSource>,
}

impl SecureClock {
    /// Creates a clock persisting its watermark under `watermark_key`.
    pub fn new(
        store: Arc<dyn StateStore>,
        watermark_key: String,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store,
            watermark_key,
            time,
        }
    }

    /// Returns the effective time and whether a rollback was detected.
    ///
    /// On rollback the watermark is returned unchanged and not advanced;
    /// otherwise the watermark moves to system time and is persisted.
    ///
    /// # Errors
    ///
    /// `StorageTampered` when the watermark entry fails its integrity
    /// check, or a store error if persistence fails.
    pub fn effective_time(&self) -> EngineResult<(i64, bool)> {
        let now = self.time.now();
        match self.store.get_json::<i64>(&self.watermark_key)? {
            Loaded::Value(watermark) if now < watermark => Ok((watermark, true)),
            Loaded::Tampered => Err(EngineError::StorageTampered),
            _ => {
                self.store.put_json(&self.watermark_key, &now)?;
                Ok((now, false))
            }
        }
    }
}
