//! The envelope protocol: encrypt outbound payloads, decrypt and verify
//! inbound payloads, and advance the replay-protection nonce chain.
//!
//! Every authenticated round trip is "triple-wrapped": transport-level
//! encryption (the transport's concern), payload encryption, and a response
//! signature over the canonicalized response body. A response that fails
//! decryption or verification is discarded entirely — its data never
//! touches the license record.
//!
//! The nonce chain imposes a total order on round trips. The server nonce
//! is persisted *before* the response is handed to the caller, so a crash
//! between side effects and persistence can never desynchronize the chain.

use crate::error::{EngineError, EngineResult};
use crate::transport::Transport;
use keygate_crypto::cipher::{open_base64, seal_base64};
use keygate_crypto::{canonicalize, verify_signature, PayloadKey};
use keygate_store::{Loaded, StateStore, StateStoreExt};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A verified authority response.
#[derive(Debug, Clone)]
pub struct ServerReply {
    /// The response payload.
    pub data: Value,
    /// Authority timestamp, when present.
    pub timestamp: Option<i64>,
}

/// Wraps and unwraps all authority traffic.
pub struct Envelope {
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    key: PayloadKey,
    verifying_key: [u8; 32],
    device_id: String,
    nonce_key: String,
}

impl Envelope {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        key: PayloadKey,
        verifying_key: [u8; 32],
        device_id: String,
        nonce_key: String,
    ) -> Self {
        Self {
            transport,
            store,
            key,
            verifying_key,
            device_id,
            nonce_key,
        }
    }

    /// Sends a payload through the authority and returns the verified reply.
    ///
    /// `skip_nonce_advance` is for fire-and-forget notifications sent during
    /// shutdown, where the response may never arrive; advancing the nonce
    /// then would desynchronize the chain for the next session.
    pub async fn send(
        &self,
        endpoint: &str,
        payload: Value,
        skip_nonce_advance: bool,
    ) -> EngineResult<ServerReply> {
        let nonce = match self.store.get_json::<String>(&self.nonce_key)? {
            Loaded::Value(n) => n,
            Loaded::Absent => Uuid::new_v4().to_string(),
            Loaded::Tampered => return Err(EngineError::StorageTampered),
        };

        let body = json!({
            "data": payload,
            "nonce": nonce,
            "deviceId": self.device_id,
        });
        let blob = seal_base64(&self.key, serde_json::to_string(&body)?.as_bytes())?;

        let response_blob = self.transport.post(endpoint, &blob).await?;

        let plaintext = open_base64(&self.key, &response_blob)?;
        let mut body: Map<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        // Fail closed: no signature means the response is untrusted.
        let signature = match body.remove("signature") {
            Some(Value::String(s)) => s,
            _ => return Err(EngineError::MissingSignature),
        };

        let canonical = canonicalize(&Value::Object(body.clone()));
        verify_signature(&self.verifying_key, canonical.as_bytes(), &signature)?;

        // Persist the new nonce before the caller sees the reply, so a
        // nonce is never spent twice.
        if !skip_nonce_advance {
            if let Some(server_nonce) = body.get("server_nonce").and_then(Value::as_str) {
                self.store
                    .put_json(&self.nonce_key, &server_nonce.to_string())?;
                debug!(endpoint, "nonce advanced");
            }
        }

        let data = body.remove("data").unwrap_or(Value::Null);
        if let Some(error) = data.get("error") {
            return Err(EngineError::from_server_error(error));
        }

        Ok(ServerReply {
            data,
            timestamp: body.get("timestamp").and_then(Value::as_i64),
        })
    }

    /// Decrypts and verifies a locally supplied signed blob — the offline
    /// activation path. No nonce is involved: the blob is not a round trip.
    pub(crate) fn verify_blob(&self, blob: &str) -> EngineResult<Value> {
        let plaintext = open_base64(&self.key, blob)?;
        let mut body: Map<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        let signature = match body.remove("signature") {
            Some(Value::String(s)) => s,
            _ => return Err(EngineError::MissingSignature),
        };
        let canonical = canonicalize(&Value::Object(body.clone()));
        verify_signature(&self.verifying_key, canonical.as_bytes(), &signature)?;

        Ok(body.remove("data").unwrap_or(Value::Null))
    }

    /// Drops the persisted nonce so the next request starts a fresh chain.
    /// Used by the nonce-desync recovery path.
    pub(crate) fn reset_nonce(&self) -> EngineResult<()> {
        self.store.delete(&self.nonce_key)?;
        Ok(())
    }
}
