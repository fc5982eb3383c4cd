//! Tests for the usage counter

use super::*;

fn tenant(name: &str) -> TenantId {
    TenantId::new(name).unwrap()
}

// ============================================================================
// In-Memory Backend
// ============================================================================

#[tokio::test]
async fn test_increment_accumulates_per_tier() {
    let backend = InMemoryUsageBackend::new();
    let t = tenant("acme");

    backend.increment(&t, "2026-08-01", Tier::Lightweight, 5).await.unwrap();
    backend.increment(&t, "2026-08-01", Tier::Lightweight, 5).await.unwrap();
    let snapshot = backend
        .increment(&t, "2026-08-01", Tier::Playwright, 25)
        .await
        .unwrap();

    assert_eq!(snapshot.requests, 3);
    assert_eq!(snapshot.units, 35);
    assert_eq!(snapshot.by_tier[&Tier::Lightweight].requests, 2);
    assert_eq!(snapshot.by_tier[&Tier::Lightweight].units, 10);
    assert_eq!(snapshot.by_tier[&Tier::Playwright].units, 25);
}

#[tokio::test]
async fn test_per_tier_sums_equal_totals() {
    let backend = InMemoryUsageBackend::new();
    let t = tenant("acme");

    for (tier, units) in [
        (Tier::Intelligence, 1),
        (Tier::Lightweight, 5),
        (Tier::Lightweight, 5),
        (Tier::Playwright, 25),
    ] {
        backend.increment(&t, "2026-08-01", tier, units).await.unwrap();
    }

    let snapshot = backend.snapshot(&t, "2026-08-01").await.unwrap();
    let unit_sum: u64 = snapshot.by_tier.values().map(|s| s.units).sum();
    let request_sum: u64 = snapshot.by_tier.values().map(|s| s.requests).sum();
    assert_eq!(unit_sum, snapshot.units);
    assert_eq!(request_sum, snapshot.requests);
}

#[tokio::test]
async fn test_tenants_and_days_are_isolated() {
    let backend = InMemoryUsageBackend::new();
    backend
        .increment(&tenant("a"), "2026-08-01", Tier::Lightweight, 5)
        .await
        .unwrap();
    backend
        .increment(&tenant("a"), "2026-08-02", Tier::Lightweight, 5)
        .await
        .unwrap();
    backend
        .increment(&tenant("b"), "2026-08-01", Tier::Lightweight, 5)
        .await
        .unwrap();

    assert_eq!(backend.units(&tenant("a"), "2026-08-01").await.unwrap(), 5);
    assert_eq!(backend.units(&tenant("a"), "2026-08-02").await.unwrap(), 5);
    assert_eq!(backend.units(&tenant("b"), "2026-08-01").await.unwrap(), 5);
    assert_eq!(backend.units(&tenant("c"), "2026-08-01").await.unwrap(), 0);
}

#[tokio::test]
async fn test_range_scan_sorted_inclusive() {
    let backend = InMemoryUsageBackend::new();
    let t = tenant("acme");
    for day in ["2026-07-30", "2026-08-01", "2026-07-31"] {
        backend.increment(&t, day, Tier::Intelligence, 1).await.unwrap();
    }

    let days = backend.range(&t, "2026-07-30", "2026-07-31").await.unwrap();
    let keys: Vec<&str> = days.iter().map(|d| d.day.as_str()).collect();
    assert_eq!(keys, vec!["2026-07-30", "2026-07-31"]);
}

#[tokio::test]
async fn test_ttl_anchor_not_reset_by_increments() {
    let backend = InMemoryUsageBackend::new();
    let t = tenant("acme");

    let first = backend
        .increment(&t, "2026-08-01", Tier::Lightweight, 5)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let second = backend
        .increment(&t, "2026-08-01", Tier::Lightweight, 5)
        .await
        .unwrap();

    assert_eq!(first.first_increment, second.first_increment);
}

// ============================================================================
// Fallback Counter
// ============================================================================

struct FailingBackend;

#[async_trait]
impl UsageBackend for FailingBackend {
    async fn increment(
        &self,
        _tenant: &TenantId,
        _day: &str,
        _tier: Tier,
        _units: u64,
    ) -> Result<UsageSnapshot, UsageError> {
        Err(UsageError::Unavailable {
            message: "connection reset".to_string(),
        })
    }

    async fn snapshot(&self, _tenant: &TenantId, _day: &str) -> Result<UsageSnapshot, UsageError> {
        Err(UsageError::Unavailable {
            message: "connection reset".to_string(),
        })
    }

    async fn units(&self, _tenant: &TenantId, _day: &str) -> Result<u64, UsageError> {
        Err(UsageError::Unavailable {
            message: "connection reset".to_string(),
        })
    }

    async fn range(
        &self,
        _tenant: &TenantId,
        _from_day: &str,
        _to_day: &str,
    ) -> Result<Vec<UsageSnapshot>, UsageError> {
        Err(UsageError::Unavailable {
            message: "connection reset".to_string(),
        })
    }
}

#[tokio::test]
async fn test_counter_falls_back_when_primary_fails() {
    let counter = UsageCounter::with_backend(Arc::new(FailingBackend));
    let t = tenant("acme");

    counter.record(&t, Tier::Lightweight, 5).await;
    counter.record(&t, Tier::Intelligence, 1).await;

    // Reads also fall back, seeing the fallback's state
    assert_eq!(counter.units_today(&t).await, 6);
    let today = counter.today(&t).await;
    assert_eq!(today.requests, 2);
}

#[tokio::test]
async fn test_in_memory_counter_roundtrip() {
    let counter = UsageCounter::in_memory();
    let t = tenant("acme");

    let snapshot = counter.record(&t, Tier::Playwright, 25).await;
    assert_eq!(snapshot.units, 25);
    assert_eq!(counter.units_today(&t).await, 25);
}
