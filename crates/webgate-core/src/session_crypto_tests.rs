//! Tests for session blob encryption

use super::*;

const PASSWORD: &str = "a reasonably long process password";

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let plaintext = b"session cookie jar contents";
    let envelope = encrypt(PASSWORD, plaintext).unwrap();
    let recovered = decrypt(PASSWORD, &envelope).unwrap();
    assert_eq!(recovered, plaintext);
}

#[test]
fn test_envelope_carries_sentinel() {
    let envelope = encrypt(PASSWORD, b"data").unwrap();
    assert!(envelope.starts_with(b"LLMB_ENC_V1"));
}

#[test]
fn test_envelopes_are_unique_per_blob() {
    // Fresh salt and nonce every call: same input, different envelopes
    let a = encrypt(PASSWORD, b"same data").unwrap();
    let b = encrypt(PASSWORD, b"same data").unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_wrong_password_fails() {
    let envelope = encrypt(PASSWORD, b"secret").unwrap();
    assert!(matches!(
        decrypt("a different password entirely", &envelope),
        Err(CryptoError::DecryptionFailed)
    ));
}

#[test]
fn test_tampered_ciphertext_fails() {
    let mut envelope = encrypt(PASSWORD, b"secret").unwrap();
    let last = envelope.len() - 1;
    envelope[last] ^= 0x01;
    assert!(matches!(
        decrypt(PASSWORD, &envelope),
        Err(CryptoError::DecryptionFailed)
    ));
}

#[test]
fn test_non_envelope_rejected() {
    assert!(matches!(
        decrypt(PASSWORD, b"just some bytes"),
        Err(CryptoError::NotAnEnvelope)
    ));
    assert!(matches!(
        decrypt(PASSWORD, b""),
        Err(CryptoError::NotAnEnvelope)
    ));
}

#[test]
fn test_future_version_rejected() {
    let envelope = b"LLMB_ENC_V9aaaaaaaaaaaaaaaabbbbbbbbbbbbcc";
    assert!(matches!(
        decrypt(PASSWORD, envelope),
        Err(CryptoError::UnsupportedVersion)
    ));
}

#[test]
fn test_truncated_envelope_rejected() {
    let envelope = encrypt(PASSWORD, b"secret").unwrap();
    let truncated = &envelope[..ENVELOPE_SENTINEL.len() + 4];
    assert!(matches!(
        decrypt(PASSWORD, truncated),
        Err(CryptoError::Truncated)
    ));
}

#[test]
fn test_empty_plaintext_roundtrip() {
    let envelope = encrypt(PASSWORD, b"").unwrap();
    assert_eq!(decrypt(PASSWORD, &envelope).unwrap(), b"");
}
