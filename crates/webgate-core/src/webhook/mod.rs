//! # Webhook Delivery
//!
//! Outbound event delivery to tenant-registered endpoints: event and
//! endpoint data model, HMAC signing, and the dispatcher with retries and
//! per-endpoint circuit breaking.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use crate::{
    DeliveryId, EndpointId, EventId, ParseError, Severity, TenantId, Timestamp,
    ValidationError,
};

mod dispatcher;
mod signature;

pub use dispatcher::{
    DispatcherConfig, EndpointSpec, WebhookDispatcher, WebhookError, WebhookStats,
};
pub use signature::{idempotency_key, sign_payload, verify_signature};

// ============================================================================
// Events
// ============================================================================

/// Event types on the wire; the names are part of the contract
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EventType {
    #[serde(rename = "fetch.succeeded")]
    FetchSucceeded,
    #[serde(rename = "fetch.failed")]
    FetchFailed,
    #[serde(rename = "pattern.learned")]
    PatternLearned,
    #[serde(rename = "pattern.degraded")]
    PatternDegraded,
    #[serde(rename = "pattern.broken")]
    PatternBroken,
    #[serde(rename = "anti_pattern.created")]
    AntiPatternCreated,
    #[serde(rename = "change.detected")]
    ChangeDetected,
    #[serde(rename = "system.health")]
    SystemHealth,
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchSucceeded => "fetch.succeeded",
            Self::FetchFailed => "fetch.failed",
            Self::PatternLearned => "pattern.learned",
            Self::PatternDegraded => "pattern.degraded",
            Self::PatternBroken => "pattern.broken",
            Self::AntiPatternCreated => "anti_pattern.created",
            Self::ChangeDetected => "change.detected",
            Self::SystemHealth => "system.health",
        }
    }

    /// Coarse grouping used for endpoint category filters
    pub fn category(&self) -> EventCategory {
        match self {
            Self::FetchSucceeded | Self::FetchFailed => EventCategory::Fetch,
            Self::PatternLearned | Self::PatternDegraded | Self::PatternBroken => {
                EventCategory::Pattern
            }
            Self::AntiPatternCreated => EventCategory::AntiPattern,
            Self::ChangeDetected => EventCategory::Change,
            Self::SystemHealth => EventCategory::System,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch.succeeded" => Ok(Self::FetchSucceeded),
            "fetch.failed" => Ok(Self::FetchFailed),
            "pattern.learned" => Ok(Self::PatternLearned),
            "pattern.degraded" => Ok(Self::PatternDegraded),
            "pattern.broken" => Ok(Self::PatternBroken),
            "anti_pattern.created" => Ok(Self::AntiPatternCreated),
            "change.detected" => Ok(Self::ChangeDetected),
            "system.health" => Ok(Self::SystemHealth),
            _ => Err(ParseError::InvalidFormat {
                expected: "a known event type".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

/// Event category for endpoint filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Fetch,
    Pattern,
    AntiPattern,
    Change,
    System,
}

/// Routing metadata attached to an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// One gateway event; serialized verbatim as the webhook POST body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: EventId,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub category: EventCategory,
    pub tenant_id: TenantId,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,

    #[serde(default)]
    pub metadata: EventMetadata,
}

impl GatewayEvent {
    /// Build an event stamped now
    pub fn new(
        event_type: EventType,
        tenant_id: TenantId,
        data: serde_json::Value,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            category: event_type.category(),
            tenant_id,
            timestamp: Timestamp::now(),
            data,
            metadata,
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Endpoint health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointHealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Rolling delivery health of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub status: EndpointHealthStatus,
    pub consecutive_failures: u32,
    pub total_deliveries: u64,
    pub total_failures: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delivery_at: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_since: Option<Timestamp>,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self {
            status: EndpointHealthStatus::Healthy,
            consecutive_failures: 0,
            total_deliveries: 0,
            total_failures: 0,
            last_delivery_at: None,
            avg_response_time_ms: None,
            unhealthy_since: None,
        }
    }
}

/// One tenant-owned webhook endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub tenant_id: TenantId,
    pub url: String,

    /// Shared HMAC secret; at least 32 characters
    pub secret: String,

    pub enabled_events: BTreeSet<EventType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_categories: Option<BTreeSet<EventCategory>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_filter: Option<String>,

    pub min_severity: Severity,
    pub enabled: bool,

    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,

    pub health: EndpointHealth,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookEndpoint {
    /// Validate endpoint invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ValidationError::InvalidFormat {
            field: "url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: "must be http or https".to_string(),
            });
        }

        if self.secret.len() < 32 {
            return Err(ValidationError::TooShort {
                field: "secret".to_string(),
                min_length: 32,
            });
        }

        if self.enabled_events.is_empty() {
            return Err(ValidationError::Required {
                field: "enabled_events".to_string(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Display for WebhookEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach logs through Display
        write!(f, "endpoint {} → {}", self.id, self.url)
    }
}

// ============================================================================
// Deliveries
// ============================================================================

/// Delivery lifecycle; `Success` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryStatus {
    /// Whether the status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One attempt-chain of a single event to a single endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub endpoint_id: EndpointId,
    pub event_id: EventId,
    pub event_type: EventType,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub max_attempts: u32,

    /// `hash(event_id, endpoint_id)`; equal events to equal endpoints
    /// always collide here so receivers can deduplicate
    pub idempotency_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<Timestamp>,

    pub created_at: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
