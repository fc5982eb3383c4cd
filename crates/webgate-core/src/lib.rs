//! # Webgate Core
//!
//! Core fetch-and-learn engine for the Webgate browsing gateway.
//!
//! This crate contains the domain logic for fetching web content through
//! cost-ordered tiers, learning durable per-domain knowledge (API shortcuts,
//! anti-patterns, verification checks), and delivering signed webhook events
//! to tenant endpoints.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations (browser drivers, counter stores) are
//!   injected at runtime
//! - The hosting layer maps operations onto its own HTTP surface; no router
//!   lives here
//!
//! ## Usage
//!
//! ```rust
//! use webgate_core::{TenantId, PatternId, Tier};
//!
//! let tenant = TenantId::new("acme").unwrap();
//! let pattern_id = PatternId::new();
//! assert_eq!(Tier::Lightweight.cost_units(), 5);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

/// Standard result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Opaque tenant identifier borrowed from the hosting layer
///
/// The core never interprets the value beyond equality and logging; it is
/// the only tenant-scoped datum the engine persists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "tenant_id".to_string(),
            });
        }

        if value.len() > 128 {
            return Err(ValidationError::TooLong {
                field: "tenant_id".to_string(),
                max_length: 128,
            });
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "tenant_id".to_string(),
                invalid_chars: "non-ASCII or whitespace".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Unique identifier for learned API patterns
///
/// Uses ULID for lexicographic sorting so registry dumps read in creation
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(Ulid);

impl PatternId {
    /// Generate a new unique pattern ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatternId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

/// Unique identifier for anti-pattern suppressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AntiPatternId(Ulid);

impl AntiPatternId {
    /// Generate a new unique anti-pattern ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AntiPatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AntiPatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for gateway events delivered over webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a new unique event ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// Get underlying UUID bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Unique identifier for webhook endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generate a new unique endpoint ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// Get underlying UUID bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EndpointId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Unique identifier for a single delivery attempt chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Generate a new unique delivery ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with millisecond wire precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from unix milliseconds
    pub fn from_unix_ms(ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ms).map(Self)
    }

    /// Unix milliseconds since epoch (wire format for webhook headers)
    pub fn unix_ms(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// UTC day key in `YYYY-MM-DD` form, used by the usage counter
    pub fn utc_day(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Add a standard duration
    pub fn add_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 + chrono_duration)
    }

    /// Subtract a standard duration
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 - chrono_duration)
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Tier and Failure Taxonomy
// ============================================================================

/// Fetch tier in increasing cost and capability order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Direct API call derived from a learned pattern; no browser
    Intelligence,
    /// Plain HTTP fetch of the HTML with static extraction
    Lightweight,
    /// Full rendered fetch through a browser driver
    Playwright,
}

impl Tier {
    /// Abstract cost units charged against the tenant budget
    pub fn cost_units(&self) -> u64 {
        match self {
            Self::Intelligence => 1,
            Self::Lightweight => 5,
            Self::Playwright => 25,
        }
    }

    /// Expected latency budget for the tier
    pub fn latency_budget(&self) -> Duration {
        match self {
            Self::Intelligence => Duration::from_secs(5),
            Self::Lightweight => Duration::from_secs(15),
            Self::Playwright => Duration::from_secs(60),
        }
    }

    /// Next more capable tier, if any
    pub fn next(&self) -> Option<Tier> {
        match self {
            Self::Intelligence => Some(Self::Lightweight),
            Self::Lightweight => Some(Self::Playwright),
            Self::Playwright => None,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intelligence => "intelligence",
            Self::Lightweight => "lightweight",
            Self::Playwright => "playwright",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intelligence" => Ok(Self::Intelligence),
            "lightweight" => Ok(Self::Lightweight),
            "playwright" => Ok(Self::Playwright),
            _ => Err(ParseError::InvalidFormat {
                expected: "intelligence, lightweight, or playwright".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

/// Failure taxonomy shared by the retry engine, pattern metrics, and
/// anti-pattern store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    AuthRequired,
    RateLimited,
    WrongEndpoint,
    ServerError,
    Timeout,
    ParseError,
    ValidationFailed,
    ContentTooShort,
    NetworkError,
    Unknown,
}

impl FailureCategory {
    /// All categories in declaration order; used for counter maps
    pub const ALL: [FailureCategory; 10] = [
        Self::AuthRequired,
        Self::RateLimited,
        Self::WrongEndpoint,
        Self::ServerError,
        Self::Timeout,
        Self::ParseError,
        Self::ValidationFailed,
        Self::ContentTooShort,
        Self::NetworkError,
        Self::Unknown,
    ];

    /// Classify an HTTP status code.
    ///
    /// 403 is treated as `AuthRequired` at the core level; geo-block
    /// detection is a hosting-layer signal.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthRequired,
            429 => Self::RateLimited,
            404 | 410 => Self::WrongEndpoint,
            500..=599 => Self::ServerError,
            408 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Get string representation matching the wire format
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::RateLimited => "rate_limited",
            Self::WrongEndpoint => "wrong_endpoint",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::ParseError => "parse_error",
            Self::ValidationFailed => "validation_failed",
            Self::ContentTooShort => "content_too_short",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity used for webhook endpoint filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Handle that fires a [`CancelToken`]
///
/// Dropping the handle without calling [`CancelHandle::cancel`] leaves the
/// token permanently un-cancelled.
#[derive(Debug)]
pub struct CancelHandle {
    tx: tokio::sync::watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired token
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Request-scoped cooperative cancellation signal
///
/// Threaded through the scheduler, retry sleeps, tier fetches, and the
/// verification pipeline. Observers poll or await; nothing is pre-empted.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: tokio::sync::watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a connected handle/token pair
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that can never fire; used where no caller cancellation exists
    pub fn never() -> CancelToken {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        // The sender is dropped; `changed()` errors and `cancelled()` pends.
        CancelToken { rx }
    }

    /// Check the current state without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation fires; pends forever on a `never` token
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ============================================================================
// Tenant Types
// ============================================================================

/// Tenant view borrowed from the hosting layer
///
/// The core reads only the identifier and unit budgets. Plan names, billing
/// state, and contact data never enter this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub daily_limit: u64,
    pub monthly_limit: u64,
}

impl Tenant {
    /// Create a tenant view with explicit budgets
    pub fn new(id: TenantId, daily_limit: u64, monthly_limit: u64) -> Self {
        Self {
            id,
            daily_limit,
            monthly_limit,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' is below minimum length of {min_length}")]
    TooShort { field: String, min_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Top-level error type returned to the hosting layer
///
/// Every variant maps to a stable `code()` string that survives refactors;
/// the hosting layer keys HTTP status mapping and client retries off it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Limit exceeded: {message}")]
    LimitExceeded {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Fetch failed ({category}): {message}")]
    FetchFailed {
        category: FailureCategory,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Build an `invalid_request` error without details
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            details: None,
        }
    }

    /// Build a `limit_exceeded` error without details
    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::LimitExceeded {
            message: message.into(),
            details: None,
        }
    }

    /// Build a `cancelled` error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Build an `internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable error code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Cancelled { .. } => "cancelled",
            Self::FetchFailed { category, .. } => category.as_str(),
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether the hosting layer may safely retry the whole request
    pub fn is_transient(&self) -> bool {
        match self {
            Self::FetchFailed { category, .. } => matches!(
                category,
                FailureCategory::RateLimited
                    | FailureCategory::ServerError
                    | FailureCategory::Timeout
                    | FailureCategory::NetworkError
            ),
            Self::Internal { .. } => true,
            _ => false,
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidRequest {
            message: err.to_string(),
            details: None,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Gateway configuration loaded from the environment
pub mod config;

/// Whitelist-based log redaction helpers
pub mod redact;

/// URL safety validation (SSRF guards)
pub mod safety;

/// Per-domain request scheduling and throttling
pub mod scheduler;

/// Failure classification and retry decisions
pub mod retry;

/// Learned API pattern registry, anti-patterns, and health tracking
pub mod patterns;

/// Tiered fetching and tier contracts
pub mod fetch;

/// Result verification pipeline
pub mod verify;

/// Per-tenant usage counters
pub mod usage;

/// Outbound webhook delivery
pub mod webhook;

/// Content change tracking
pub mod tracker;

/// Session blob encryption
pub mod session_crypto;

/// Engine wiring and operation surface
pub mod engine;

// Re-export key types for convenience
pub use config::GatewayConfig;
pub use engine::{
    BatchItemStatus, BatchOptions, BatchOutcome, DomainSummary, Engine, EngineDeps, UsageReport,
};
pub use fetch::{
    FetchContent, FetchOptions, FetchResult, FreshnessRequirement, LightweightTier, OnFailure,
    RenderedExtras, RenderedTier, TierError, TierOutcome, TierResponse,
};
pub use patterns::{
    AntiPattern, ApiPattern, FailureRecord, HealthStatus, PatternEvent, PatternHealth,
    PatternMatch, PatternMetrics, PatternRegistry, TemplateType,
};
pub use retry::{RetryDecision, RetryEngine};
pub use safety::{SafetyConfig, SafetyVerdict, UnsafeCategory};
pub use scheduler::{DomainRateLimit, DomainScheduler};
pub use tracker::{
    ChangeReport, ChangeSignificance, ContentTracker, TrackedUrl, TrackedUrlFilter,
};
pub use usage::{UsageBackend, UsageCounter, UsageSnapshot};
pub use verify::{CheckOutcome, CheckSeverity, VerificationMode, VerificationReport, Verifier};
pub use webhook::{
    EndpointSpec, EventCategory, EventMetadata, EventType, GatewayEvent, WebhookDelivery,
    WebhookDispatcher, WebhookEndpoint,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
