//! Shared test helpers: a scripted authority that plays the server side of
//! the envelope protocol with real encryption, real signatures, and a real
//! nonce chain.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use keygate_crypto::cipher::{open_base64, seal_base64};
use keygate_crypto::{canonicalize, PayloadKey};
use keygate_session::transport::mock::MockTransport;
use keygate_session::{EngineError, EngineResult, LicenseSession, SessionConfig, TimeSource};
use keygate_store::MemoryStore;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const ENCRYPTION_KEY: [u8; 32] = [42u8; 32];
pub const SIGNING_SEED: [u8; 32] = [7u8; 32];
pub const START_TIME: i64 = 1_700_000_000;

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&SIGNING_SEED)
}

pub fn verifying_key_bytes() -> [u8; 32] {
    signing_key().verifying_key().to_bytes()
}

pub fn payload_key() -> PayloadKey {
    PayloadKey::from_bytes(ENCRYPTION_KEY)
}

/// A controllable wall clock.
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(now: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A decrypted request as the authority sees it.
pub struct InboundRequest {
    pub data: Value,
    pub nonce: String,
    pub device_id: String,
}

pub fn open_request(blob: &str) -> InboundRequest {
    let plaintext = open_base64(&payload_key(), blob).expect("request must decrypt");
    let body: Value = serde_json::from_slice(&plaintext).expect("request must parse");
    InboundRequest {
        data: body["data"].clone(),
        nonce: body["nonce"].as_str().expect("nonce present").to_string(),
        device_id: body["deviceId"]
            .as_str()
            .expect("deviceId present")
            .to_string(),
    }
}

/// Builds a signed, encrypted response envelope around `data`.
pub fn signed_reply(data: Value, server_nonce: &str, timestamp: i64) -> String {
    let mut body = Map::new();
    body.insert("data".to_string(), data);
    body.insert(
        "server_nonce".to_string(),
        Value::String(server_nonce.to_string()),
    );
    body.insert("timestamp".to_string(), json!(timestamp));

    let canonical = canonicalize(&Value::Object(body.clone()));
    let signature = signing_key().sign(canonical.as_bytes());
    body.insert(
        "signature".to_string(),
        Value::String(STANDARD.encode(signature.to_bytes())),
    );

    let plaintext = serde_json::to_string(&Value::Object(body)).unwrap();
    seal_base64(&payload_key(), plaintext.as_bytes()).unwrap()
}

/// An unsigned (and therefore untrusted) response envelope.
pub fn unsigned_reply(data: Value, server_nonce: &str) -> String {
    let body = json!({"data": data, "server_nonce": server_nonce, "timestamp": START_TIME});
    seal_base64(&payload_key(), serde_json::to_string(&body).unwrap().as_bytes()).unwrap()
}

/// A baseline active license. Tests mutate fields via the authority.
pub fn base_license() -> Value {
    json!({
        "key": "TEST-0001-0001",
        "project": "testproj",
        "status": "ACTIVE",
        "validUntil": START_TIME + 365 * 86_400,
        "activeSeats": 1,
        "maxConcurrentSeats": 2,
        "seatStatus": "active",
        "tokensLimit": 100,
        "tokensConsumed": 0,
        "tokensRemaining": 100,
        "seatsEnabled": true,
        "tokensEnabled": true,
        "offlineEnabled": true,
        "offlineGraceHours": 24,
        "authorizedDevices": [],
    })
}

pub struct AuthorityState {
    /// License handed out on the next successful reply.
    pub license: Value,
    /// Nonce the next request must echo. `None` accepts anything (first
    /// contact, or after the chain was reset server-side).
    pub expected_nonce: Option<String>,
    nonce_counter: u64,
    /// Error object injected into the next reply, once.
    pub next_error: Option<Value>,
    /// Decrypted request payloads, per endpoint, in order.
    pub requests: Vec<(String, Value)>,
    pub clock: Arc<ManualClock>,
}

/// Plays the authority behind a [`MockTransport`]: decrypts requests,
/// enforces the nonce chain, signs replies.
pub struct Authority {
    pub state: Mutex<AuthorityState>,
}

impl Authority {
    pub fn new(license: Value, clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AuthorityState {
                license,
                expected_nonce: None,
                nonce_counter: 0,
                next_error: None,
                requests: Vec::new(),
                clock,
            }),
        })
    }

    pub fn set_license(&self, license: Value) {
        self.state.lock().unwrap().license = license;
    }

    pub fn patch_license(&self, field: &str, value: Value) {
        self.state.lock().unwrap().license[field] = value;
    }

    pub fn inject_error(&self, code: &str, extra: Value) {
        let mut error = json!({"code": code, "message": code.to_lowercase()});
        if let (Some(obj), Some(more)) = (error.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.state.lock().unwrap().next_error = Some(error);
    }

    /// Forces the chain forward so the client's persisted nonce is stale.
    pub fn desync_nonce(&self) {
        self.state.lock().unwrap().expected_nonce = Some("not-what-you-have".to_string());
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn handle(&self, endpoint: &str, blob: &str) -> EngineResult<String> {
        let request = open_request(blob);
        let mut st = self.state.lock().unwrap();
        st.requests
            .push((endpoint.to_string(), request.data.clone()));
        let now = st.clock.now.load(Ordering::SeqCst);

        st.nonce_counter += 1;
        let next_nonce = format!("srv-{}", st.nonce_counter);

        // Activation bootstraps a fresh chain; every other endpoint must
        // echo the nonce issued by the previous reply.
        if let (Some(expected), false) = (&st.expected_nonce, endpoint == "activate") {
            if *expected != request.nonce {
                st.expected_nonce = Some(next_nonce.clone());
                let data = json!({"error": {"code": "NONCE_MISMATCH", "message": "nonce mismatch"}});
                return Ok(signed_reply(data, &next_nonce, now));
            }
        }
        st.expected_nonce = Some(next_nonce.clone());

        if let Some(error) = st.next_error.take() {
            return Ok(signed_reply(json!({ "error": error }), &next_nonce, now));
        }

        let data = match endpoint {
            "activate" | "validate" | "heartbeat" | "consume" | "consume-batch" => {
                json!({"license": st.license.clone()})
            }
            "seats" => json!({"seats": {
                "seats": [
                    {"deviceId": request.device_id, "lastSeen": now, "isSelf": true},
                    {"deviceId": "other-device", "nickname": "Studio PC", "lastSeen": now - 60, "isSelf": false},
                ],
                "maxSeats": 2,
                "activeSeats": 2,
                "canRelease": true,
            }}),
            "release-seat" | "deactivate" => json!({"ok": true}),
            other => panic!("unexpected endpoint {other}"),
        };
        Ok(signed_reply(data, &next_nonce, now))
    }
}

pub struct Harness {
    pub session: LicenseSession,
    pub authority: Arc<Authority>,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// Routes engine tracing through the test writer so `--nocapture` shows it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("keygate_session=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new("testproj", verifying_key_bytes(), ENCRYPTION_KEY)
        .with_heartbeat_interval(60)
        .with_client_version("1.0.0-test")
}

/// Wires a session to a scripted authority over an in-memory store.
pub fn harness() -> Harness {
    harness_with(base_license(), test_config())
}

pub fn harness_with(license: Value, config: SessionConfig) -> Harness {
    init_tracing();
    let clock = ManualClock::at(START_TIME);
    let authority = Authority::new(license, clock.clone());
    let transport = {
        let authority = authority.clone();
        Arc::new(MockTransport::new(move |endpoint, blob| {
            authority.handle(endpoint, blob)
        }))
    };
    let store = Arc::new(MemoryStore::new(payload_key()));
    let session = LicenseSession::with_time_source(
        config,
        transport.clone(),
        store.clone(),
        clock.clone(),
    );
    Harness {
        session,
        authority,
        transport,
        store,
        clock,
    }
}

/// A transport that answers every endpoint with one fixed blob.
pub fn fixed_reply_transport(blob: String) -> Arc<MockTransport> {
    Arc::new(MockTransport::new(move |_, _| Ok(blob.clone())))
}

/// Drains every event currently queued on a subscription.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<keygate_session::SessionEvent>,
) -> Vec<keygate_session::SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn network_err() -> EngineError {
    EngineError::Network("connection refused".to_string())
}
