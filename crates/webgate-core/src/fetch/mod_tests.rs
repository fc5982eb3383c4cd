//! Tests for fetch data types

use super::*;

#[test]
fn test_fetch_options_defaults() {
    let options = FetchOptions::default();
    assert!(!options.follow_pagination);
    assert!(options.max_cost_tier.is_none());
    assert_eq!(options.freshness_requirement, FreshnessRequirement::Any);
    assert_eq!(options.on_failure, OnFailure::Fallback);
    assert!(!options.include_decision_trace);
}

#[test]
fn test_fetch_options_deserialize_sparse_json() {
    // Hosting layers send only the fields the client set
    let options: FetchOptions =
        serde_json::from_str(r#"{"max_cost_tier": "lightweight", "scroll_to_load": true}"#)
            .unwrap();
    assert_eq!(options.max_cost_tier, Some(Tier::Lightweight));
    assert!(options.scroll_to_load);
    assert!(!options.dismiss_cookie_banner);
}

#[test]
fn test_fetch_result_serde_roundtrip() {
    let result = FetchResult {
        final_url: "https://example.com/".to_string(),
        http_status: 200,
        content: FetchContent {
            markdown: "# Hi".to_string(),
            text: "Hi".to_string(),
            html: None,
        },
        tables: Some(vec![Table {
            headers: vec!["a".to_string()],
            rows: vec![vec!["1".to_string()]],
        }]),
        links: None,
        discovered_apis: Some(vec!["https://example.com/api".to_string()]),
        tier_used: Tier::Playwright,
        tiers_attempted: vec![Tier::Lightweight, Tier::Playwright],
        duration_ms: 1200,
        tier_cost_units: 25,
        verification_confidence: 0.9,
        structured_data: None,
        decision_trace: Some(vec!["tier plan: [lightweight, playwright]".to_string()]),
    };

    let json = serde_json::to_string(&result).unwrap();
    let restored: FetchResult = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.tier_used, Tier::Playwright);
    assert_eq!(restored.tiers_attempted.len(), 2);
    assert_eq!(restored.tier_cost_units, 25);
}

#[test]
fn test_fetch_result_omits_empty_optionals() {
    let result = FetchResult {
        final_url: "https://example.com/".to_string(),
        http_status: 200,
        content: FetchContent::default(),
        tables: None,
        links: None,
        discovered_apis: None,
        tier_used: Tier::Lightweight,
        tiers_attempted: vec![Tier::Lightweight],
        duration_ms: 1,
        tier_cost_units: 5,
        verification_confidence: 1.0,
        structured_data: None,
        decision_trace: None,
    };
    let json = serde_json::to_string(&result).unwrap();
    assert!(!json.contains("tables"));
    assert!(!json.contains("decision_trace"));
}

#[test]
fn test_tier_error_display() {
    let err = TierError::new(FailureCategory::RateLimited, "429 from upstream");
    assert!(err.to_string().contains("rate_limited"));
    assert!(err.to_string().contains("429 from upstream"));
}

#[test]
fn test_request_fingerprint_stability() {
    let options = FetchOptions::default();
    let a = request_fingerprint("tenant-a", "https://example.com/page", &options);
    let b = request_fingerprint("tenant-a", "https://example.com/page", &options);
    assert_eq!(a, b);

    // Tenant, URL, and options all partition the fingerprint
    assert_ne!(
        a,
        request_fingerprint("tenant-b", "https://example.com/page", &options)
    );
    assert_ne!(
        a,
        request_fingerprint("tenant-a", "https://example.com/other", &options)
    );
    let mut changed = FetchOptions::default();
    changed.scroll_to_load = true;
    assert_ne!(
        a,
        request_fingerprint("tenant-a", "https://example.com/page", &changed)
    );
}
