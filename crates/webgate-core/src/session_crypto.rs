//! # Session Blob Encryption
//!
//! AES-256-GCM envelopes for persisted session blobs.
//!
//! Envelope layout: `LLMB_ENC_V1` sentinel, 16-byte PBKDF2 salt, 12-byte
//! nonce, ciphertext with tag. Salt and nonce are fresh per blob; the key
//! is derived from the process password with PBKDF2-HMAC-SHA256.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Version sentinel prefixed to every envelope
pub const ENVELOPE_SENTINEL: &[u8] = b"LLMB_ENC_V1";

/// PBKDF2 iteration count
const PBKDF2_ROUNDS: u32 = 100_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Error type for envelope operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    #[error("blob is not a session envelope")]
    NotAnEnvelope,

    #[error("envelope version is not supported")]
    UnsupportedVersion,

    #[error("envelope is truncated")]
    Truncated,

    #[error("decryption failed; wrong key or corrupted blob")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, key.as_mut());
    key
}

/// Encrypt a session blob under a password-derived key
pub fn encrypt(password: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    use rand::RngCore;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut envelope =
        Vec::with_capacity(ENVELOPE_SENTINEL.len() + SALT_LEN + NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(ENVELOPE_SENTINEL);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt a session envelope
pub fn decrypt(password: &str, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // The sentinel doubles as the version tag: same prefix, wrong suffix
    // means a future format rather than garbage
    const PREFIX: &[u8] = b"LLMB_ENC_";
    if envelope.len() < PREFIX.len() || &envelope[..PREFIX.len()] != PREFIX {
        return Err(CryptoError::NotAnEnvelope);
    }
    if envelope.len() < ENVELOPE_SENTINEL.len()
        || &envelope[..ENVELOPE_SENTINEL.len()] != ENVELOPE_SENTINEL
    {
        return Err(CryptoError::UnsupportedVersion);
    }

    let rest = &envelope[ENVELOPE_SENTINEL.len()..];
    if rest.len() < SALT_LEN + NONCE_LEN {
        return Err(CryptoError::Truncated);
    }

    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
#[path = "session_crypto_tests.rs"]
mod tests;
