//! Webhook payload signing and verification.
//!
//! Signatures are `sha256=<hex>` over the raw POST body with HMAC-SHA256
//! keyed by the endpoint secret. Verification is constant-time so
//! signature oracles cannot leak the secret byte by byte.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{EndpointId, EventId};

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix carried by every signature
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign a payload body with the endpoint secret.
///
/// Returns the full header value, prefix included.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature in constant time.
///
/// Accepts the value with or without the `sha256=` prefix. Malformed hex
/// fails closed.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let hex_part = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(claimed) = hex::decode(hex_part) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(claimed.as_slice()).into()
}

/// Stable idempotency key of one (event, endpoint) pair
pub fn idempotency_key(event_id: &EventId, endpoint_id: &EndpointId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update(endpoint_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
