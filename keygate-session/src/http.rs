//! HTTP transport for the licensing authority.
//!
//! Carries the opaque encrypted blob inside a `{"blob": ...}` JSON wrapper
//! on both legs. The wrapper is this transport's concern; the engine only
//! ever sees blob strings.

use crate::error::{EngineError, EngineResult};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize, Deserialize)]
struct BlobBody {
    blob: String,
}

/// Talks to the authority over HTTPS.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport against `base_url`, e.g.
    /// `https://api.keygate.io/v1/license`.
    pub fn new(base_url: impl Into<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, endpoint: &str, blob: &str) -> EngineResult<String> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(%url, "posting envelope");

        let response = self
            .client
            .post(&url)
            .json(&BlobBody {
                blob: blob.to_string(),
            })
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Network(format!(
                "authority returned HTTP {status}"
            )));
        }

        let body: BlobBody = response
            .json()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(body.blob)
    }
}
