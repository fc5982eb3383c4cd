//! Tests for the webhook data model

use super::*;
use std::collections::BTreeSet;

fn endpoint() -> WebhookEndpoint {
    let now = Timestamp::now();
    WebhookEndpoint {
        id: EndpointId::new(),
        tenant_id: TenantId::new("acme").unwrap(),
        url: "https://hooks.example.com/webgate".to_string(),
        secret: "0123456789abcdef0123456789abcdef".to_string(),
        enabled_events: BTreeSet::from([EventType::FetchSucceeded]),
        enabled_categories: None,
        domain_filter: None,
        min_severity: Severity::Low,
        enabled: true,
        max_retries: 3,
        initial_retry_delay_ms: 1000,
        max_retry_delay_ms: 60_000,
        extra_headers: None,
        health: EndpointHealth::default(),
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Event Wire Format
// ============================================================================

#[test]
fn test_event_type_wire_names() {
    assert_eq!(EventType::FetchSucceeded.as_str(), "fetch.succeeded");
    assert_eq!(EventType::AntiPatternCreated.as_str(), "anti_pattern.created");

    let json = serde_json::to_string(&EventType::PatternDegraded).unwrap();
    assert_eq!(json, "\"pattern.degraded\"");

    let parsed: EventType = "change.detected".parse().unwrap();
    assert_eq!(parsed, EventType::ChangeDetected);
    assert!("nonsense.event".parse::<EventType>().is_err());
}

#[test]
fn test_event_categories() {
    assert_eq!(EventType::FetchFailed.category(), EventCategory::Fetch);
    assert_eq!(EventType::PatternBroken.category(), EventCategory::Pattern);
    assert_eq!(
        EventType::AntiPatternCreated.category(),
        EventCategory::AntiPattern
    );
    assert_eq!(EventType::ChangeDetected.category(), EventCategory::Change);
    assert_eq!(EventType::SystemHealth.category(), EventCategory::System);
}

#[test]
fn test_event_body_shape() {
    let event = GatewayEvent::new(
        EventType::FetchSucceeded,
        TenantId::new("acme").unwrap(),
        serde_json::json!({"url": "https://example.com"}),
        EventMetadata {
            domain: Some("example.com".to_string()),
            severity: Some(Severity::Medium),
        },
    );

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "fetch.succeeded");
    assert_eq!(value["category"], "fetch");
    assert_eq!(value["tenant_id"], "acme");
    assert_eq!(value["metadata"]["severity"], "medium");
    assert!(value["timestamp"].is_string());
}

// ============================================================================
// Endpoint Validation
// ============================================================================

#[test]
fn test_valid_endpoint_passes() {
    assert!(endpoint().validate().is_ok());
}

#[test]
fn test_short_secret_rejected() {
    let mut bad = endpoint();
    bad.secret = "too-short".to_string();
    assert!(matches!(
        bad.validate(),
        Err(ValidationError::TooShort { .. })
    ));
}

#[test]
fn test_non_http_url_rejected() {
    let mut bad = endpoint();
    bad.url = "ftp://hooks.example.com/".to_string();
    assert!(bad.validate().is_err());

    bad.url = "not a url".to_string();
    assert!(bad.validate().is_err());
}

#[test]
fn test_no_enabled_events_rejected() {
    let mut bad = endpoint();
    bad.enabled_events.clear();
    assert!(matches!(
        bad.validate(),
        Err(ValidationError::Required { .. })
    ));
}

#[test]
fn test_endpoint_display_hides_secret() {
    let endpoint = endpoint();
    let shown = endpoint.to_string();
    assert!(!shown.contains(&endpoint.secret));
}

// ============================================================================
// Delivery State Machine
// ============================================================================

#[test]
fn test_delivery_terminal_states() {
    assert!(!DeliveryStatus::Pending.is_terminal());
    assert!(!DeliveryStatus::Retrying.is_terminal());
    assert!(DeliveryStatus::Success.is_terminal());
    assert!(DeliveryStatus::Failed.is_terminal());
}
