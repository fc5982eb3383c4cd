//! Whitelist-based log redaction.
//!
//! The boundary logger never emits raw header bags or option maps. Fields
//! pass through only when their key is on the known-safe list; everything
//! else is replaced with a fixed marker so secrets cannot leak through new
//! code paths by default.

use serde_json::Value;
use std::collections::HashMap;

/// Replacement emitted for any non-whitelisted field
pub const REDACTED: &str = "<REDACTED>";

/// Keys that are safe to log verbatim.
///
/// The list is additive-only: a key absent here is redacted, so forgetting
/// to register a new field fails safe.
const SAFE_KEYS: &[&str] = &[
    "accept",
    "accept-language",
    "cache-control",
    "content-length",
    "content-type",
    "domain",
    "etag",
    "host",
    "last-modified",
    "location",
    "method",
    "retry-after",
    "status",
    "tier",
    "url",
    "user-agent",
];

/// Check whether a field key may be logged verbatim
pub fn is_safe_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SAFE_KEYS.contains(&lowered.as_str())
}

/// Redact a header-style string map, keeping only whitelisted keys.
pub fn redact_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            let value = if is_safe_key(k) {
                v.clone()
            } else {
                REDACTED.to_string()
            };
            (k.clone(), value)
        })
        .collect()
}

/// Recursively redact a JSON value in place.
///
/// Object keys not on the whitelist have their values replaced; arrays and
/// nested objects are walked. Scalars at the top level are left alone since
/// they carry no key context.
pub fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_safe_key(key) {
                    continue;
                }
                match entry {
                    Value::Object(_) | Value::Array(_) => redact_json(entry),
                    _ => *entry = Value::String(REDACTED.to_string()),
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_json(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
