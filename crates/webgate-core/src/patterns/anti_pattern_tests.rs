//! Tests for the anti-pattern store

use super::*;

fn store() -> AntiPatternStore {
    AntiPatternStore::new(AntiPatternConfig { min_failures: 3 })
}

// ============================================================================
// Threshold Behavior
// ============================================================================

#[test]
fn test_below_threshold_creates_nothing() {
    let store = store();
    let pattern = PatternId::new();

    assert!(store
        .record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401")
        .is_none());
    assert!(store
        .record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401")
        .is_none());
    assert!(!store.is_suppressed(pattern, "example.com", Timestamp::now()));
}

#[test]
fn test_third_failure_creates_anti_pattern() {
    let store = store();
    let pattern = PatternId::new();

    for _ in 0..2 {
        store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    }
    let anti = store
        .record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401")
        .expect("threshold crossing creates anti-pattern");

    assert_eq!(anti.failure_category, FailureCategory::AuthRequired);
    assert_eq!(anti.recommended_action, RecommendedAction::SkipDomain);
    assert_eq!(anti.expires_at_ms, 0); // indefinite
    assert_eq!(anti.failure_count, 3);
    assert!(anti.domains.contains("example.com"));
    assert!(store.is_suppressed(pattern, "example.com", Timestamp::now()));
}

#[test]
fn test_categories_accumulate_independently() {
    let store = store();
    let pattern = PatternId::new();

    store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    store.record_failure(pattern, "example.com", FailureCategory::RateLimited, "429");
    store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    // Two auth failures and one rate-limit: no threshold crossed
    assert!(!store.is_suppressed(pattern, "example.com", Timestamp::now()));
}

#[test]
fn test_domains_accumulate_independently() {
    let store = store();
    let pattern = PatternId::new();

    store.record_failure(pattern, "a.com", FailureCategory::WrongEndpoint, "404");
    store.record_failure(pattern, "b.com", FailureCategory::WrongEndpoint, "404");
    store.record_failure(pattern, "a.com", FailureCategory::WrongEndpoint, "404");
    assert!(!store.is_suppressed(pattern, "a.com", Timestamp::now()));

    let anti = store
        .record_failure(pattern, "a.com", FailureCategory::WrongEndpoint, "404")
        .expect("third a.com failure crosses");
    assert!(anti.domains.contains("a.com"));
    assert!(!store.is_suppressed(pattern, "b.com", Timestamp::now()));
}

// ============================================================================
// Action Mapping
// ============================================================================

#[test]
fn test_action_mapping_per_category() {
    let cases = [
        (
            FailureCategory::AuthRequired,
            RecommendedAction::SkipDomain,
            0u64,
        ),
        (
            FailureCategory::RateLimited,
            RecommendedAction::Backoff,
            3_600_000,
        ),
        (
            FailureCategory::WrongEndpoint,
            RecommendedAction::SkipDomain,
            6 * 3_600_000,
        ),
        (
            FailureCategory::ServerError,
            RecommendedAction::TryAlternative,
            6 * 3_600_000,
        ),
        (
            FailureCategory::ParseError,
            RecommendedAction::TryAlternative,
            6 * 3_600_000,
        ),
    ];

    for (category, expected_action, expected_duration_ms) in cases {
        let store = store();
        let pattern = PatternId::new();
        let mut created = None;
        for _ in 0..3 {
            created = store.record_failure(pattern, "example.com", category, "r");
        }
        let anti = created.unwrap_or_else(|| panic!("no anti-pattern for {}", category));
        assert_eq!(anti.recommended_action, expected_action, "{}", category);
        assert_eq!(
            anti.suppression_duration_ms, expected_duration_ms,
            "{}",
            category
        );
    }
}

// ============================================================================
// Expiry and Duplicates
// ============================================================================

#[test]
fn test_expired_suppression_is_inactive() {
    let store = store();
    let pattern = PatternId::new();
    for _ in 0..3 {
        store.record_failure(pattern, "example.com", FailureCategory::RateLimited, "429");
    }
    let now = Timestamp::now();
    assert!(store.is_suppressed(pattern, "example.com", now));

    // One hour suppression: inactive afterwards
    let later = now.add_duration(std::time::Duration::from_secs(3601));
    assert!(!store.is_suppressed(pattern, "example.com", later));
}

#[test]
fn test_active_suppression_absorbs_further_failures() {
    let store = store();
    let pattern = PatternId::new();
    for _ in 0..3 {
        store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    }

    // Further failures advance the existing record instead of duplicating
    assert!(store
        .record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401")
        .is_none());

    let all = store.list();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].failure_count, 4);
}

#[test]
fn test_clear_removes_suppression() {
    let store = store();
    let pattern = PatternId::new();
    for _ in 0..3 {
        store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    }
    let id = store.list()[0].id;

    assert!(store.clear(id));
    assert!(!store.is_suppressed(pattern, "example.com", Timestamp::now()));
    assert!(!store.clear(id));
}

#[test]
fn test_purge_drops_expired() {
    let store = store();
    let pattern = PatternId::new();
    for _ in 0..3 {
        store.record_failure(pattern, "example.com", FailureCategory::RateLimited, "429");
    }
    assert_eq!(store.list().len(), 1);

    // Force expiry by rewriting the stored record through restore()
    let mut all = store.list();
    all[0].expires_at_ms = Timestamp::now()
        .subtract_duration(std::time::Duration::from_secs(10))
        .unix_ms();
    store.restore(all);

    store.purge_expired();
    assert!(store.list().is_empty());
}

#[test]
fn test_active_for_lists_ids() {
    let store = store();
    let pattern = PatternId::new();
    for _ in 0..3 {
        store.record_failure(pattern, "example.com", FailureCategory::AuthRequired, "401");
    }
    let active = store.active_for(pattern, Timestamp::now());
    assert_eq!(active.len(), 1);
    assert!(store.active_for(PatternId::new(), Timestamp::now()).is_empty());
}
