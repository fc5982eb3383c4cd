//! # URL Safety Validation
//!
//! Synchronous SSRF guards applied before any URL reaches the scheduler.
//!
//! Validation is purely syntactic: no DNS resolution happens here, so a
//! hostname that resolves to a private address at fetch time is the HTTP
//! client's resolver policy to enforce. The guards cover the address
//! literals and well-known hostnames that account for the practical attack
//! surface.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use url::Url;

// ============================================================================
// Configuration
// ============================================================================

/// Safety validator configuration
///
/// Every guard can be opted out individually for controlled environments;
/// `disable_all` exists for test fixtures only and is never the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Permit RFC1918 targets (10/8, 172.16/12, 192.168/16)
    pub allow_private_ips: bool,

    /// Permit loopback targets (localhost, 127.0.0.0/8, 0.0.0.0)
    pub allow_localhost: bool,

    /// Permit link-local targets (169.254/16)
    pub allow_link_local: bool,

    /// Permit cloud metadata endpoints
    pub allow_metadata_endpoints: bool,

    /// Hostnames exempt from every block
    pub allowed_hostnames: HashSet<String>,

    /// Disable validation wholesale. Test fixtures only.
    pub disable_all: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allow_private_ips: false,
            allow_localhost: false,
            allow_link_local: false,
            allow_metadata_endpoints: false,
            allowed_hostnames: HashSet::new(),
            disable_all: false,
        }
    }
}

impl SafetyConfig {
    /// Configuration that admits loopback targets; used by tests exercising
    /// local stub servers
    pub fn permissive_local() -> Self {
        Self {
            allow_localhost: true,
            allow_private_ips: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// Verdict Types
// ============================================================================

/// Category of a rejected URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeCategory {
    Protocol,
    PrivateIp,
    Localhost,
    LinkLocal,
    Metadata,
    BlockedHostname,
}

impl UnsafeCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::PrivateIp => "private_ip",
            Self::Localhost => "localhost",
            Self::LinkLocal => "link_local",
            Self::Metadata => "metadata",
            Self::BlockedHostname => "blocked_hostname",
        }
    }
}

/// Outcome of validating one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub category: Option<UnsafeCategory>,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn safe() -> Self {
        Self {
            safe: true,
            category: None,
            reason: None,
        }
    }

    fn unsafe_because(category: UnsafeCategory, reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            category: Some(category),
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Cloud metadata hostnames and address literals
const METADATA_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "100.100.100.200",
];

/// Validate a URL string against the configured guards.
///
/// Returns an unsafe verdict for malformed URLs as well; the caller treats
/// both identically (`invalid_request`).
pub fn validate_url(raw: &str, config: &SafetyConfig) -> SafetyVerdict {
    if config.disable_all {
        return SafetyVerdict::safe();
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            return SafetyVerdict::unsafe_because(
                UnsafeCategory::Protocol,
                format!("URL does not parse: {}", e),
            )
        }
    };

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return SafetyVerdict::unsafe_because(
                UnsafeCategory::Protocol,
                format!("scheme '{}' is not allowed", other),
            )
        }
    }

    let host = match url.host_str() {
        Some(host) => host.trim_end_matches('.').to_ascii_lowercase(),
        None => {
            return SafetyVerdict::unsafe_because(
                UnsafeCategory::Protocol,
                "URL has no host".to_string(),
            )
        }
    };

    // An explicit allowlist entry overrides every hostname-based block.
    if config.allowed_hostnames.contains(&host) {
        return SafetyVerdict::safe();
    }

    // Metadata hosts are checked before the link-local range so that
    // 169.254.169.254 reports the more specific category.
    if METADATA_HOSTS.contains(&host.as_str()) {
        if !config.allow_metadata_endpoints {
            return SafetyVerdict::unsafe_because(
                UnsafeCategory::Metadata,
                format!("'{}' is a cloud metadata endpoint", host),
            );
        }
        return SafetyVerdict::safe();
    }

    if host == "localhost" || host.ends_with(".localhost") {
        if !config.allow_localhost {
            return SafetyVerdict::unsafe_because(
                UnsafeCategory::Localhost,
                format!("'{}' is a loopback hostname", host),
            );
        }
        return SafetyVerdict::safe();
    }

    // IPv6 literals arrive bracketed from Url::host_str
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(addr) = bare.parse::<IpAddr>() {
        return validate_ip(addr, config);
    }

    SafetyVerdict::safe()
}

fn validate_ip(addr: IpAddr, config: &SafetyConfig) -> SafetyVerdict {
    match addr {
        IpAddr::V4(v4) => validate_ipv4(v4, config),
        IpAddr::V6(v6) => {
            if v6.is_loopback() && !config.allow_localhost {
                return SafetyVerdict::unsafe_because(
                    UnsafeCategory::Localhost,
                    "IPv6 loopback address".to_string(),
                );
            }
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return validate_ipv4(mapped, config);
            }
            SafetyVerdict::safe()
        }
    }
}

fn validate_ipv4(addr: Ipv4Addr, config: &SafetyConfig) -> SafetyVerdict {
    let octets = addr.octets();

    if (addr.is_loopback() || addr.is_unspecified()) && !config.allow_localhost {
        return SafetyVerdict::unsafe_because(
            UnsafeCategory::Localhost,
            format!("{} is a loopback address", addr),
        );
    }

    let is_private = octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168);
    if is_private && !config.allow_private_ips {
        return SafetyVerdict::unsafe_because(
            UnsafeCategory::PrivateIp,
            format!("{} is in a private range", addr),
        );
    }

    if octets[0] == 169 && octets[1] == 254 && !config.allow_link_local {
        return SafetyVerdict::unsafe_because(
            UnsafeCategory::LinkLocal,
            format!("{} is link-local", addr),
        );
    }

    SafetyVerdict::safe()
}

#[cfg(test)]
#[path = "safety_tests.rs"]
mod tests;
