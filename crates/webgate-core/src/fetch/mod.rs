//! # Fetching
//!
//! Fetch options, canonical results, and the tier contracts the fetcher
//! delegates to.
//!
//! The fetcher itself never talks to the network; each tier does, behind a
//! trait. The intelligence tier is the pattern registry, the lightweight
//! tier is a plain HTTP client with static extraction, and the rendered
//! tier is an injected browser driver the core only knows as a trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CancelToken, FailureCategory, Tier};

mod fetcher;
mod lightweight;

pub use fetcher::{
    request_fingerprint, FetchFailure, FetchSuccess, FetcherConfig, TieredFetcher,
};
pub use lightweight::HttpLightweightTier;

// ============================================================================
// Options
// ============================================================================

/// Freshness hint forwarded to the content-change tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessRequirement {
    Realtime,
    Cached,
    #[default]
    Any,
}

/// What the verifier should recommend when checks fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Re-run the same tier
    Retry,
    /// Escalate to the next tier
    #[default]
    Fallback,
    /// Surface the result as-is
    Report,
}

/// Per-request fetch options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default)]
    pub follow_pagination: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,

    #[serde(default)]
    pub scroll_to_load: bool,

    #[serde(default)]
    pub dismiss_cookie_banner: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_tier: Option<Tier>,

    #[serde(default)]
    pub freshness_requirement: FreshnessRequirement,

    #[serde(default)]
    pub include_decision_trace: bool,

    #[serde(default)]
    pub verification: crate::verify::VerificationMode,

    #[serde(default)]
    pub on_failure: OnFailure,
}

// ============================================================================
// Results
// ============================================================================

/// Canonical content block of a fetch result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContent {
    pub markdown: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Extracted table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Extracted hyperlink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Canonical result returned to the hosting layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub final_url: String,
    pub http_status: u16,
    pub content: FetchContent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Table>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_apis: Option<Vec<String>>,

    pub tier_used: Tier,
    pub tiers_attempted: Vec<Tier>,
    pub duration_ms: u64,
    pub tier_cost_units: u64,

    /// Confidence from the verification pipeline, in [0, 1]
    pub verification_confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_trace: Option<Vec<String>>,
}

// ============================================================================
// Tier Contracts
// ============================================================================

/// Raw HTTP view a tier produces alongside extracted content
#[derive(Debug, Clone, Default)]
pub struct TierResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// What one tier hands back on success
#[derive(Debug, Clone, Default)]
pub struct TierOutcome {
    pub response: TierResponse,
    pub final_url: String,
    pub content: FetchContent,
    pub tables: Option<Vec<Table>>,
    pub links: Option<Vec<Link>>,
    pub discovered_apis: Option<Vec<String>>,
    pub structured_data: Option<serde_json::Value>,
}

/// Classified tier failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("tier fetch failed ({category}): {message}")]
pub struct TierError {
    pub category: FailureCategory,
    pub message: String,
    pub status_code: Option<u16>,
}

impl TierError {
    /// Build a tier error without a status code
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            status_code: None,
        }
    }
}

/// Lightweight tier: plain HTTP fetch with static extraction
#[async_trait]
pub trait LightweightTier: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        timeout: std::time::Duration,
        cancel: &CancelToken,
    ) -> Result<TierOutcome, TierError>;
}

/// Extra signals only a rendered fetch can produce
#[derive(Debug, Clone, Default)]
pub struct RenderedExtras {
    /// URLs of network requests the page issued while rendering
    pub network_requests: Vec<String>,

    /// Console messages captured during the render
    pub console_messages: Vec<String>,

    /// Serialized final DOM
    pub final_dom: Option<String>,
}

/// Rendered tier: full browser fetch.
///
/// The driver lives outside the core; tests inject doubles.
#[async_trait]
pub trait RenderedTier: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        timeout: std::time::Duration,
        cancel: &CancelToken,
    ) -> Result<(TierOutcome, RenderedExtras), TierError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
