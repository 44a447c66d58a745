//! Transport layer abstraction.
//!
//! The engine only ever hands opaque encrypted blobs to the transport and
//! gets opaque blobs back; the outer `{"blob": …}` wire envelope and the
//! concrete HTTP client are the transport's concern.

use crate::error::EngineResult;
use async_trait::async_trait;

/// Carries encrypted envelopes to and from the license authority.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts an encrypted request blob to an authority endpoint and returns
    /// the encrypted response blob.
    async fn post(&self, endpoint: &str, blob: &str) -> EngineResult<String>;
}

/// A scripted transport for testing.
pub mod mock {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&str, &str) -> EngineResult<String> + Send + Sync>;

    /// A transport backed by a closure playing the authority.
    pub struct MockTransport {
        handler: Handler,
        offline: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        /// Creates a transport that answers with `handler(endpoint, blob)`.
        pub fn new(
            handler: impl Fn(&str, &str) -> EngineResult<String> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                offline: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Simulates losing or regaining connectivity.
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Endpoints called so far, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(&self, endpoint: &str, blob: &str) -> EngineResult<String> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(EngineError::Network("connection refused".to_string()));
            }
            self.calls.lock().unwrap().push(endpoint.to_string());
            (self.handler)(endpoint, blob)
        }
    }
}
