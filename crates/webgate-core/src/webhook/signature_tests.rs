//! Tests for webhook signing

use super::*;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn test_sign_and_verify_roundtrip() {
    let body = br#"{"type":"fetch.succeeded"}"#;
    let signature = sign_payload(SECRET, body);

    assert!(signature.starts_with("sha256="));
    assert!(verify_signature(SECRET, body, &signature));
}

#[test]
fn test_verify_accepts_bare_hex() {
    let body = b"payload";
    let signature = sign_payload(SECRET, body);
    let bare = signature.strip_prefix("sha256=").unwrap();
    assert!(verify_signature(SECRET, body, bare));
}

#[test]
fn test_verify_rejects_wrong_secret_of_equal_length() {
    let body = b"payload";
    let signature = sign_payload(SECRET, body);

    let other = "fedcba9876543210fedcba9876543210";
    assert_eq!(other.len(), SECRET.len());
    assert!(!verify_signature(other, body, &signature));
}

#[test]
fn test_verify_rejects_tampered_body() {
    let signature = sign_payload(SECRET, b"original");
    assert!(!verify_signature(SECRET, b"tampered", &signature));
}

#[test]
fn test_verify_rejects_malformed_hex() {
    assert!(!verify_signature(SECRET, b"payload", "sha256=not-hex!"));
    assert!(!verify_signature(SECRET, b"payload", ""));
}

#[test]
fn test_signature_is_deterministic() {
    let body = b"same payload";
    assert_eq!(sign_payload(SECRET, body), sign_payload(SECRET, body));
}

#[test]
fn test_idempotency_key_stability() {
    let event = EventId::new();
    let endpoint = EndpointId::new();

    let a = idempotency_key(&event, &endpoint);
    let b = idempotency_key(&event, &endpoint);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64); // hex sha256

    // Different endpoint, different key
    assert_ne!(a, idempotency_key(&event, &EndpointId::new()));
    // Different event, different key
    assert_ne!(a, idempotency_key(&EventId::new(), &endpoint));
}
