//! Store key layout, namespaced per project.

/// Builds store keys for one project's persisted state.
#[derive(Debug, Clone)]
pub(crate) struct Namespace {
    project: String,
}

impl Namespace {
    pub(crate) fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    fn key(&self, entry: &str) -> String {
        format!("{}/{entry}", self.project)
    }

    /// Current license key.
    pub(crate) fn license_key(&self) -> String {
        self.key("license_key")
    }

    /// Cached license snapshot.
    pub(crate) fn snapshot(&self) -> String {
        self.key("snapshot")
    }

    /// Current replay-protection nonce.
    pub(crate) fn nonce(&self) -> String {
        self.key("nonce")
    }

    /// Timestamp of the last confirmed server sync.
    pub(crate) fn last_sync(&self) -> String {
        self.key("last_sync")
    }

    /// Queue of consumptions made while offline.
    pub(crate) fn pending(&self) -> String {
        self.key("pending_consumptions")
    }

    /// Monotonic clock watermark.
    pub(crate) fn watermark(&self) -> String {
        self.key("clock_watermark")
    }
}
