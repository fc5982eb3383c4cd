//! Tests for the pattern registry

use super::*;
use crate::patterns::{
    bootstrap_patterns, load_registry_file, AntiPatternConfig, ContentMapping, PatternMetrics,
    PatternValidation,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry() -> Arc<PatternRegistry> {
    Arc::new(PatternRegistry::new(
        RegistryConfig::default(),
        Arc::new(AntiPatternStore::new(AntiPatternConfig::default())),
    ))
}

fn failure_record(id: PatternId, category: FailureCategory) -> FailureRecord {
    FailureRecord {
        timestamp: Timestamp::now(),
        category,
        status_code: Some(500),
        message: "failed".to_string(),
        domain: "reddit.com".to_string(),
        attempted_url: "https://reddit.com/x".to_string(),
        pattern_id: id,
        response_time_ms: Some(50),
    }
}

// ============================================================================
// Bootstrap and Matching
// ============================================================================

#[test]
fn test_bootstrap_only_seeds_empty_registry() {
    let registry = registry();
    registry.bootstrap();
    let count = registry.stats().total;
    assert_eq!(count, 5);

    registry.bootstrap();
    assert_eq!(registry.stats().total, count);
}

#[test]
fn test_match_reddit_comment_url_yields_json_endpoint() {
    let registry = registry();
    registry.bootstrap();

    let matches = registry.match_url("https://reddit.com/r/foo/comments/xyz789/other/");
    assert!(!matches.is_empty());

    let top = &matches[0];
    assert!(top.api_endpoint.ends_with(".json"), "{}", top.api_endpoint);
    assert!(top.confidence >= 0.5);
    assert_eq!(
        top.api_endpoint,
        "https://www.reddit.com/r/foo/comments/xyz789/other.json"
    );
}

#[test]
fn test_match_extracts_registry_lookup_vars() {
    let registry = registry();
    registry.bootstrap();

    let matches = registry.match_url("https://www.npmjs.com/package/express");
    assert!(!matches.is_empty());
    let top = &matches[0];
    assert_eq!(top.extracted_vars["name"], "express");
    assert_eq!(top.api_endpoint, "https://registry.npmjs.org/express");
}

#[test]
fn test_match_unrelated_url_is_empty() {
    let registry = registry();
    registry.bootstrap();
    assert!(registry
        .match_url("https://unknown-site.example/anything")
        .is_empty());
}

#[test]
fn test_match_garbage_url_is_empty() {
    let registry = registry();
    registry.bootstrap();
    assert!(registry.match_url("not a url").is_empty());
}

#[test]
fn test_match_orders_by_confidence() {
    let registry = registry();
    registry.bootstrap();

    let url = "https://reddit.com/r/foo/comments/abc/title/";
    let reddit_id = registry.match_url(url)[0].pattern.id;

    // Clone the reddit seed with higher confidence and a distinct id
    let mut stronger = registry.get(reddit_id).unwrap();
    stronger.id = PatternId::new();
    stronger.metrics = PatternMetrics::starting_at(0.9);
    let stronger_id = stronger.id;
    registry.insert(stronger);

    let matches = registry.match_url(url);
    assert!(matches.len() >= 2);
    assert_eq!(matches[0].pattern.id, stronger_id);
}

#[test]
fn test_archived_patterns_do_not_match() {
    let registry = registry();
    registry.bootstrap();

    let url = "https://reddit.com/r/foo/comments/abc/title/";
    let id = registry.match_url(url)[0].pattern.id;

    let mut pattern = registry.get(id).unwrap();
    pattern.archived = true;
    registry.insert(pattern);

    assert!(registry.match_url(url).is_empty());
}

// ============================================================================
// Anti-Pattern Suppression
// ============================================================================

#[test]
fn test_suppressed_pattern_excluded_from_match() {
    let registry = registry();
    registry.bootstrap();

    let url = "https://reddit.com/r/foo/comments/abc/title/";
    let id = registry.match_url(url)[0].pattern.id;

    // Three auth failures on the domain harden into a suppression
    for _ in 0..3 {
        registry
            .anti_patterns()
            .record_failure(id, "reddit.com", FailureCategory::AuthRequired, "401");
    }

    assert!(registry.match_url(url).is_empty());

    // Clearing the suppression restores the candidate
    let anti_id = registry.anti_patterns().list()[0].id;
    registry.anti_patterns().clear(anti_id);
    assert!(!registry.match_url(url).is_empty());
}

// ============================================================================
// Outcome Observation
// ============================================================================

#[test]
fn test_observe_success_updates_metrics_and_confidence() {
    let registry = registry();
    registry.bootstrap();
    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;

    registry.observe_success(id, 120, "reddit.com");
    registry.observe_success(id, 80, "reddit.com");

    let pattern = registry.get(id).unwrap();
    assert_eq!(pattern.metrics.success_count, 2);
    assert!(pattern.metrics.confidence > 0.5);
    assert_eq!(pattern.metrics.avg_response_time_ms, Some(100.0));
    assert!(pattern.last_used_at.is_some());
}

#[test]
fn test_observe_failure_counts_by_category() {
    let registry = registry();
    registry.bootstrap();
    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;

    registry.observe_failure(failure_record(id, FailureCategory::ServerError));
    registry.observe_failure(failure_record(id, FailureCategory::Timeout));
    registry.observe_failure(failure_record(id, FailureCategory::ServerError));

    let pattern = registry.get(id).unwrap();
    assert_eq!(pattern.metrics.failure_count, 3);
    assert_eq!(pattern.metrics.categorized_failures(), 3);
    assert_eq!(pattern.metrics.recent_failures.len(), 3);
    assert!(pattern.metrics.confidence < 0.5);
}

#[test]
fn test_success_failure_counts_are_exact() {
    let registry = registry();
    registry.bootstrap();
    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;

    for _ in 0..7 {
        registry.observe_success(id, 10, "reddit.com");
    }
    for _ in 0..4 {
        registry.observe_failure(failure_record(id, FailureCategory::NetworkError));
    }

    let metrics = registry.get(id).unwrap().metrics;
    assert_eq!(metrics.success_count, 7);
    assert_eq!(metrics.failure_count, 4);
    assert_eq!(metrics.categorized_failures(), 4);
}

#[test]
fn test_events_emitted_on_observation() {
    let registry = registry();
    registry.bootstrap();
    let mut events = registry.subscribe();

    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;
    registry.observe_success(id, 50, "reddit.com");

    let first = events.try_recv().unwrap();
    assert_eq!(
        first,
        PatternEvent::PatternApplied {
            pattern_id: id,
            success: true
        }
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        PatternEvent::PatternUpdated { .. }
    ));
}

// ============================================================================
// Learning and Transfer
// ============================================================================

#[test]
fn test_learn_from_observation() {
    let registry = registry();
    let mut events = registry.subscribe();

    let learned = registry
        .learn(&SuccessObservation {
            page_url: "https://forum.example.com/t/topic-slug/98765/".to_string(),
            api_url: "https://forum.example.com/t/topic-slug/98765.json".to_string(),
            content_type: Some("application/json".to_string()),
            domain: "forum.example.com".to_string(),
        })
        .expect("json-suffix shape should infer");

    assert_eq!(learned.template_type, TemplateType::JsonSuffix);
    assert!((learned.metrics.confidence - 0.5).abs() < 1e-9);
    assert!(registry.get(learned.id).is_some());
    assert!(matches!(
        events.try_recv().unwrap(),
        PatternEvent::PatternLearned { .. }
    ));

    // The learned pattern matches sibling topics
    let matches = registry.match_url("https://forum.example.com/t/another-topic/11111/");
    assert!(!matches.is_empty());
    assert!(matches[0].api_endpoint.ends_with(".json"));
}

#[test]
fn test_learn_unrecognized_shape_returns_none() {
    let registry = registry();
    assert!(registry
        .learn(&SuccessObservation {
            page_url: "https://example.com/page".to_string(),
            api_url: "https://elsewhere.net/completely/unrelated".to_string(),
            content_type: None,
            domain: "example.com".to_string(),
        })
        .is_none());
}

#[test]
fn test_transfer_below_similarity_floor_refused() {
    let registry = registry();
    registry.bootstrap();
    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;

    assert!(registry.transfer(id, "lemmy.world", 0.2).is_none());
}

#[test]
fn test_transfer_rewrites_domain_and_decays_confidence() {
    let registry = registry();
    registry.bootstrap();
    let source = registry.match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .clone();

    let transferred = registry
        .transfer(source.id, "lemmy.world", 0.8)
        .expect("similarity above floor");

    assert_ne!(transferred.id, source.id);
    assert!((transferred.metrics.confidence - source.metrics.confidence * 0.5).abs() < 1e-9);
    assert_eq!(transferred.fallback_patterns, vec![source.id]);
    assert!(transferred.metrics.domains.contains("lemmy.world"));

    // The copy matches URLs on the target domain
    let matches = registry.match_url("https://lemmy.world/r/foo/comments/abc/title/");
    assert!(matches.iter().any(|m| m.pattern.id == transferred.id));
}

// ============================================================================
// Decay and Archival
// ============================================================================

#[test]
fn test_decay_reduces_confidence_of_stale_patterns() {
    let registry = registry();
    let mut stale = bootstrap_patterns().remove(0);
    let long_ago = Timestamp::now().subtract_duration(Duration::from_secs(12 * 24 * 3600));
    stale.last_used_at = Some(long_ago);
    stale.created_at = long_ago;
    let id = stale.id;
    registry.insert(stale);

    registry.decay();

    // Twelve days idle, seven days grace: five decay days at 1% each
    let confidence = registry.get(id).unwrap().metrics.confidence;
    assert!((confidence - 0.45).abs() < 1e-9, "got {}", confidence);
}

#[test]
fn test_decay_spares_recently_used_patterns() {
    let registry = registry();
    registry.bootstrap();
    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;
    registry.observe_success(id, 10, "reddit.com");
    let before = registry.get(id).unwrap().metrics.confidence;

    registry.decay();
    assert_eq!(registry.get(id).unwrap().metrics.confidence, before);
}

#[test]
fn test_decay_archives_persistently_untrusted_patterns() {
    let registry = registry();
    let mut doomed = bootstrap_patterns().remove(0);
    let long_ago = Timestamp::now().subtract_duration(Duration::from_secs(60 * 24 * 3600));
    doomed.metrics = PatternMetrics::starting_at(0.05);
    doomed.below_threshold_since = Some(long_ago);
    doomed.last_used_at = Some(Timestamp::now());
    let id = doomed.id;
    registry.insert(doomed);

    let mut events = registry.subscribe();
    registry.decay();

    assert!(registry.get(id).unwrap().archived);
    assert!(matches!(
        events.try_recv().unwrap(),
        PatternEvent::PatternArchived { .. }
    ));

    // Archived patterns remain in stats
    let stats = registry.stats();
    assert_eq!(stats.archived, 1);
    assert_eq!(stats.total, 1);
}

// ============================================================================
// Indices and Queries
// ============================================================================

#[test]
fn test_patterns_for_domain() {
    let registry = registry();
    registry.bootstrap();

    let reddit = registry.patterns_for_domain("reddit.com");
    assert_eq!(reddit.len(), 1);
    assert_eq!(reddit[0].template_type, TemplateType::JsonSuffix);
    assert!(registry.patterns_for_domain("nowhere.example").is_empty());
}

#[test]
fn test_patterns_of_type() {
    let registry = registry();
    registry.bootstrap();
    assert_eq!(registry.patterns_of_type(TemplateType::QueryApi).len(), 1);
}

#[test]
fn test_stats_shape() {
    let registry = registry();
    registry.bootstrap();
    let stats = registry.stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.active, 5);
    assert_eq!(stats.archived, 0);
    assert!((stats.mean_confidence - 0.5).abs() < 1e-9);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_registry_persist_and_restore_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patterns.json");

    let registry = registry();
    registry.bootstrap();
    registry.enable_persistence(path.clone());

    let id = registry
        .match_url("https://reddit.com/r/a/comments/b/c/")[0]
        .pattern
        .id;
    registry.observe_success(id, 42, "reddit.com");
    registry.flush().await;

    let snapshot = load_registry_file(&path).await.unwrap().unwrap();
    let restored = PatternRegistry::new(
        RegistryConfig::default(),
        Arc::new(AntiPatternStore::default()),
    );
    restored.restore(snapshot);

    let pattern = restored.get(id).unwrap();
    assert_eq!(pattern.metrics.success_count, 1);
    assert!(pattern.metrics.domains.contains("reddit.com"));

    // The restored registry matches the same URLs
    assert!(!restored
        .match_url("https://reddit.com/r/a/comments/b/c/")
        .is_empty());
}

// ============================================================================
// Application (wiremock)
// ============================================================================

fn mock_pattern(endpoint: String) -> PatternMatch {
    let now = Timestamp::now();
    let pattern = ApiPattern {
        id: PatternId::new(),
        template_type: TemplateType::RestResource,
        url_patterns: vec!["^https?://site\\.example/items/\\d+$".to_string()],
        endpoint_template: endpoint.clone(),
        extractors: vec![],
        method: "GET".to_string(),
        headers: None,
        response_format: crate::patterns::ResponseFormat::Json,
        content_mapping: ContentMapping {
            title: "title".to_string(),
            description: None,
            body: Some("body".to_string()),
            metadata: None,
        },
        validation: PatternValidation {
            required_fields: vec!["title".to_string()],
            min_content_length: 5,
            max_response_time_ms: None,
            expected_content_type: Some("application/json".to_string()),
        },
        metrics: PatternMetrics::default(),
        fallback_patterns: vec![],
        created_at: now,
        updated_at: now,
        last_used_at: None,
        archived: false,
        below_threshold_since: None,
        last_decay_at: None,
    };
    PatternMatch {
        pattern,
        extracted_vars: HashMap::new(),
        api_endpoint: endpoint,
        confidence: 0.5,
    }
}

#[tokio::test]
async fn test_apply_success_maps_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "title": "An Item",
            "body": "Plenty of body text here",
        })))
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let outcome = registry.apply(&matched).await.unwrap();
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.content.title, "An Item");
    assert_eq!(
        outcome.content.body.as_deref(),
        Some("Plenty of body text here")
    );
    assert!(outcome.structured.is_some());
}

#[tokio::test]
async fn test_apply_server_error_categorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let err = registry.apply(&matched).await.unwrap_err();
    assert_eq!(err.category, FailureCategory::ServerError);
    assert_eq!(err.status_code, Some(503));
}

#[tokio::test]
async fn test_apply_auth_wall_categorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let err = registry.apply(&matched).await.unwrap_err();
    assert_eq!(err.category, FailureCategory::AuthRequired);
}

#[tokio::test]
async fn test_apply_missing_required_field_is_validation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"unrelated": true})),
        )
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let err = registry.apply(&matched).await.unwrap_err();
    assert_eq!(err.category, FailureCategory::ValidationFailed);
}

#[tokio::test]
async fn test_apply_thin_content_is_content_too_short() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "x"})),
        )
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let err = registry.apply(&matched).await.unwrap_err();
    assert_eq!(err.category, FailureCategory::ContentTooShort);
}

#[tokio::test]
async fn test_apply_non_json_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>nope</html>")
                .insert_header("content-type", "application/json"),
        )
        .mount(&server)
        .await;

    let registry = registry();
    let matched = mock_pattern(format!("{}/api/item", server.uri()));

    let err = registry.apply(&matched).await.unwrap_err();
    assert_eq!(err.category, FailureCategory::ParseError);
}
