//! Session configuration.

use serde::{Deserialize, Serialize};

/// Fallback heartbeat interval when the authority does not direct one.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 300;

/// Configuration for a license session.
///
/// A session is explicitly constructed from this — there is no ambient
/// global instance. Keys are distributed with the client build; the
/// verifying key checks response signatures, the encryption key wraps
/// payloads and the local cache.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Project identifier; namespaces all persisted state.
    pub project_id: String,
    /// Ed25519 public key used to verify authority signatures.
    pub verifying_key: [u8; 32],
    /// Symmetric key for payload and cache encryption.
    pub encryption_key: [u8; 32],
    /// Base heartbeat interval in seconds. A server-provided interval
    /// always overrides this at runtime.
    pub heartbeat_interval_secs: u64,
    /// Client/software version string sent with activation.
    pub client_version: String,
    /// Validate a cached license automatically when the session starts.
    pub auto_validate_on_start: bool,
    /// Optional human-readable nickname for this device, shown to other
    /// seats of the same license.
    pub device_nickname: Option<String>,
}

impl SessionConfig {
    /// Creates a config with defaults for everything but identity and keys.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        verifying_key: [u8; 32],
        encryption_key: [u8; 32],
    ) -> Self {
        Self {
            project_id: project_id.into(),
            verifying_key,
            encryption_key,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            auto_validate_on_start: true,
            device_nickname: None,
        }
    }

    /// Sets the base heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    /// Sets the client version string.
    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Sets the device nickname.
    #[must_use]
    pub fn with_device_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.device_nickname = Some(nickname.into());
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("project_id", &self.project_id)
            .field("verifying_key", &"[public]")
            .field("encryption_key", &"[REDACTED]")
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("client_version", &self.client_version)
            .field("auto_validate_on_start", &self.auto_validate_on_start)
            .field("device_nickname", &self.device_nickname)
            .finish()
    }
}
