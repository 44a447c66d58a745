mod common;

use common::{sign_b64, test_keypair};
use keygate_crypto::{canonicalize, verify_signature, CryptoError};
use serde_json::json;

#[test]
fn valid_signature_verifies() {
    let (sk, pk) = test_keypair();
    let message = canonicalize(&json!({"data": {"status": "ACTIVE"}, "server_nonce": "n1"}));
    let sig = sign_b64(&sk, message.as_bytes());
    assert!(verify_signature(&pk, message.as_bytes(), &sig).is_ok());
}

#[test]
fn signature_over_canonical_form_survives_reordering() {
    let (sk, pk) = test_keypair();
    // The authority signs its canonical form; a client that received the
    // same object with different key order must still verify.
    let signed_form = canonicalize(&json!({"a": 1, "b": 2}));
    let sig = sign_b64(&sk, signed_form.as_bytes());

    let reordered = canonicalize(&serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap());
    assert!(verify_signature(&pk, reordered.as_bytes(), &sig).is_ok());
}

#[test]
fn flipped_message_byte_fails() {
    let (sk, pk) = test_keypair();
    let message = b"exact bytes".to_vec();
    let sig = sign_b64(&sk, &message);

    let mut tampered = message.clone();
    tampered[0] ^= 0x01;
    assert!(matches!(
        verify_signature(&pk, &tampered, &sig),
        Err(CryptoError::InvalidSignature)
    ));
}

#[test]
fn wrong_public_key_fails() {
    let (sk, _) = test_keypair();
    let sig = sign_b64(&sk, b"message");
    let other_pk = [3u8; 32];
    assert!(verify_signature(&other_pk, b"message", &sig).is_err());
}

#[test]
fn malformed_signature_rejected() {
    let (_, pk) = test_keypair();
    assert!(matches!(
        verify_signature(&pk, b"message", "not base64 !!"),
        Err(CryptoError::InvalidSignature)
    ));
    assert!(matches!(
        verify_signature(&pk, b"message", "AAAA"),
        Err(CryptoError::InvalidSignature)
    ));
}
