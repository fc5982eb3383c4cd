//! Tests for the verification pipeline

use super::*;
use crate::fetch::{FetchContent, FetchResult};
use crate::Tier;

fn result_with(status: u16, markdown: &str, text: &str) -> FetchResult {
    FetchResult {
        final_url: "https://example.com/page".to_string(),
        http_status: status,
        content: FetchContent {
            markdown: markdown.to_string(),
            text: text.to_string(),
            html: None,
        },
        tables: None,
        links: None,
        discovered_apis: None,
        tier_used: Tier::Lightweight,
        tiers_attempted: vec![Tier::Lightweight],
        duration_ms: 12,
        tier_cost_units: 5,
        verification_confidence: 0.0,
        structured_data: None,
        decision_trace: None,
    }
}

fn long_text() -> String {
    "sufficiently long page content ".repeat(10)
}

struct AlwaysUpProbe;

#[async_trait::async_trait]
impl StateProbe for AlwaysUpProbe {
    async fn probe(&self, _url: &str) -> bool {
        true
    }
}

struct AlwaysDownProbe;

#[async_trait::async_trait]
impl StateProbe for AlwaysDownProbe {
    async fn probe(&self, _url: &str) -> bool {
        false
    }
}

// ============================================================================
// Built-in Modes
// ============================================================================

#[tokio::test]
async fn test_basic_mode_passes_good_result() {
    let verifier = Verifier::with_probe(std::sync::Arc::new(AlwaysUpProbe));
    let result = result_with(200, &long_text(), "");
    let checks = builtin_checks(VerificationMode::Basic);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(report.passed);
    assert!((report.confidence - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_basic_mode_fails_short_content() {
    let verifier = Verifier::new();
    let result = result_with(200, "tiny", "also tiny");
    let checks = builtin_checks(VerificationMode::Basic);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(!report.passed);
    // One of two checks passed, scaled by the error factor
    assert!((report.confidence - 0.5 * 0.6).abs() < 1e-9);
    assert_eq!(report.failure_category(), FailureCategory::ContentTooShort);
}

#[tokio::test]
async fn test_basic_mode_uses_longer_of_markdown_and_text() {
    let verifier = Verifier::new();
    // Markdown short, text long: the longer field clears the floor
    let result = result_with(200, "x", &long_text());
    let checks = builtin_checks(VerificationMode::Basic);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(report.passed);
}

#[tokio::test]
async fn test_standard_mode_rejects_block_pages() {
    let verifier = Verifier::new();
    let body = format!("{} Access Denied {}", long_text(), long_text());
    let result = result_with(200, &body, "");
    let checks = builtin_checks(VerificationMode::Standard);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(!report.passed);
    assert_eq!(report.failure_category(), FailureCategory::ValidationFailed);
}

#[tokio::test]
async fn test_thorough_mode_warning_does_not_fail() {
    let verifier = Verifier::new();
    // 60 chars: clears the 50 floor, misses the 100 thorough floor
    let body = "a".repeat(60);
    let result = result_with(200, &body, "");
    let checks = builtin_checks(VerificationMode::Thorough);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    // Warning failures do not fail the result but do cost confidence
    assert!(report.passed);
    assert!(report.confidence < 1.0);
}

#[tokio::test]
async fn test_non_200_fails_status_check() {
    let verifier = Verifier::new();
    let result = result_with(500, &long_text(), "");
    let checks = builtin_checks(VerificationMode::Basic);

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(!report.passed);
}

// ============================================================================
// Check Types
// ============================================================================

#[tokio::test]
async fn test_content_field_matches() {
    let verifier = Verifier::new();
    let result = result_with(200, "version 2.4.1 released", "");
    let checks = vec![CheckSpec::Content {
        name: "has_version".to_string(),
        field: "markdown".to_string(),
        kind: ContentCheckKind::FieldMatches {
            pattern: r"\d+\.\d+\.\d+".to_string(),
        },
        severity: CheckSeverity::Error,
    }];

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(report.passed);
}

#[tokio::test]
async fn test_structured_data_field_checks() {
    let verifier = Verifier::new();
    let mut result = result_with(200, &long_text(), "");
    result.structured_data = Some(serde_json::json!({
        "item": {"price": "9.99"}
    }));

    let checks = vec![CheckSpec::Content {
        name: "price_present".to_string(),
        field: "item.price".to_string(),
        kind: ContentCheckKind::FieldNotEmpty,
        severity: CheckSeverity::Critical,
    }];
    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(report.passed);

    let missing = vec![CheckSpec::Content {
        name: "sku_present".to_string(),
        field: "item.sku".to_string(),
        kind: ContentCheckKind::FieldExists,
        severity: CheckSeverity::Critical,
    }];
    let report = verifier
        .verify(&result, &missing, None, Default::default())
        .await;
    assert!(!report.passed);
    // Critical failure scales hardest
    assert!((report.confidence - 0.0 * 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_state_check_uses_probe() {
    let up = Verifier::with_probe(std::sync::Arc::new(AlwaysUpProbe));
    let down = Verifier::with_probe(std::sync::Arc::new(AlwaysDownProbe));
    let result = result_with(200, &long_text(), "");
    let checks = vec![CheckSpec::State {
        name: "api_reachable".to_string(),
        url: "https://api.example.com/health".to_string(),
        severity: CheckSeverity::Error,
    }];

    assert!(up
        .verify(&result, &checks, None, Default::default())
        .await
        .passed);
    assert!(!down
        .verify(&result, &checks, None, Default::default())
        .await
        .passed);
}

#[tokio::test]
async fn test_custom_check() {
    let verifier = Verifier::new();
    let result = result_with(200, &long_text(), "");
    let checks = vec![CheckSpec::Custom {
        name: "tier_is_cheap".to_string(),
        severity: CheckSeverity::Warning,
        check: std::sync::Arc::new(|r: &FetchResult| r.tier_cost_units <= 5),
    }];

    let report = verifier
        .verify(&result, &checks, None, Default::default())
        .await;
    assert!(report.passed);
}

#[tokio::test]
async fn test_on_failure_hint_is_propagated() {
    let verifier = Verifier::new();
    let result = result_with(500, "x", "");
    let checks = builtin_checks(VerificationMode::Basic);

    let report = verifier
        .verify(&result, &checks, None, crate::fetch::OnFailure::Report)
        .await;
    assert_eq!(report.on_failure, crate::fetch::OnFailure::Report);
}

// ============================================================================
// Schema Validation
// ============================================================================

#[tokio::test]
async fn test_schema_validation_pass() {
    let verifier = Verifier::new();
    let mut result = result_with(200, &long_text(), "");
    result.structured_data = Some(serde_json::json!({"name": "thing", "count": 3}));

    let schema = serde_json::json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string"},
            "count": {"type": "integer"}
        }
    });

    let report = verifier
        .verify(
            &result,
            &builtin_checks(VerificationMode::Basic),
            Some(&schema),
            Default::default(),
        )
        .await;
    assert!(report.passed);
    assert!(report.schema_violations.is_empty());
}

#[tokio::test]
async fn test_schema_violations_reported_with_paths() {
    let schema = serde_json::json!({
        "type": "object",
        "required": ["name"],
        "properties": {"count": {"type": "integer"}}
    });
    let data = serde_json::json!({"count": "not a number"});

    let violations = validate_schema(&schema, &data);
    assert!(!violations.is_empty());
    assert!(violations.iter().any(|v| v.path.contains("count")));
    assert!(violations.iter().any(|v| v.keyword == "type" || v.keyword == "required"));
}

#[tokio::test]
async fn test_schema_against_missing_structured_data_fails() {
    let verifier = Verifier::new();
    let result = result_with(200, &long_text(), "");
    let schema = serde_json::json!({"type": "object"});

    let report = verifier
        .verify(
            &result,
            &builtin_checks(VerificationMode::Basic),
            Some(&schema),
            Default::default(),
        )
        .await;
    assert!(!report.passed);
    assert_eq!(report.schema_violations.len(), 1);
}
