//! Tests for the per-domain scheduler

use super::*;
use crate::CancelToken;

fn limit(rpm: u32, min_delay_ms: u64) -> DomainRateLimit {
    DomainRateLimit {
        requests_per_minute: rpm,
        min_delay: Duration::from_millis(min_delay_ms),
    }
}

// ============================================================================
// Domain Normalization
// ============================================================================

#[test]
fn test_normalize_strips_www() {
    assert_eq!(normalize_domain("www.example.com"), "example.com");
    assert_eq!(normalize_domain("Example.COM"), "example.com");
    assert_eq!(normalize_domain("example.com."), "example.com");
    // Only a leading www. is stripped
    assert_eq!(normalize_domain("wwwx.example.com"), "wwwx.example.com");
}

#[test]
fn test_limit_resolution_parent_fallback() {
    let scheduler = DomainScheduler::new(limit(30, 500));
    scheduler.register_limit("example.com", limit(6, 1000));

    assert_eq!(scheduler.limit_for("example.com"), limit(6, 1000));
    assert_eq!(scheduler.limit_for("www.example.com"), limit(6, 1000));
    assert_eq!(scheduler.limit_for("api.example.com"), limit(6, 1000));
    assert_eq!(scheduler.limit_for("deep.api.example.com"), limit(6, 1000));
    // Unrelated domains use the default bucket
    assert_eq!(scheduler.limit_for("other.net"), limit(30, 500));
}

// ============================================================================
// Throttle Behavior
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_min_delay_spacing() {
    let scheduler = std::sync::Arc::new(DomainScheduler::new(limit(100, 1000)));
    let cancel = CancelToken::never();

    let t0 = Instant::now();
    scheduler.acquire("example.com", &cancel).await.unwrap();
    scheduler.acquire("example.com", &cancel).await.unwrap();
    scheduler.acquire("example.com", &cancel).await.unwrap();

    // Three starts spaced by min_delay
    assert!(Instant::now().duration_since(t0) >= Duration::from_millis(2000));
    assert_eq!(scheduler.window_len("example.com").await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_burst_respects_window_and_spacing() {
    let scheduler = std::sync::Arc::new(DomainScheduler::new(limit(6, 1000)));
    let t0 = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancelToken::never();
            scheduler.acquire("burst.test", &cancel).await.unwrap();
            Instant::now()
        }));
    }

    let mut completions = Vec::new();
    for handle in handles {
        completions.push(handle.await.unwrap());
    }
    completions.sort();

    // 6th start no earlier than t0 + 5s (five min_delay gaps)
    assert!(completions[5].duration_since(t0) >= Duration::from_secs(5));
    // 7th start no earlier than t0 + 60s (window of 6 must roll)
    assert!(completions[6].duration_since(t0) >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_independent_domains_do_not_throttle_each_other() {
    let scheduler = DomainScheduler::new(limit(6, 5000));
    let cancel = CancelToken::never();

    let t0 = Instant::now();
    scheduler.acquire("a.example.org", &cancel).await.unwrap();
    scheduler.acquire("b.example.org", &cancel).await.unwrap();

    // No shared window between sibling domains without a registered parent
    assert!(Instant::now().duration_since(t0) < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_window_expires() {
    let scheduler = DomainScheduler::new(limit(2, 0));
    let cancel = CancelToken::never();

    scheduler.acquire("expiry.test", &cancel).await.unwrap();
    scheduler.acquire("expiry.test", &cancel).await.unwrap();
    assert_eq!(scheduler.window_len("expiry.test").await, 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(scheduler.window_len("expiry.test").await, 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_records_nothing() {
    let scheduler = std::sync::Arc::new(DomainScheduler::new(limit(100, 10_000)));
    let never = CancelToken::never();

    scheduler.acquire("cancel.test", &never).await.unwrap();

    let (handle, token) = CancelToken::new();
    let waiter = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.acquire("cancel.test", &token).await })
    };

    // Let the waiter enter its sleep, then cancel it
    tokio::time::advance(Duration::from_millis(100)).await;
    handle.cancel();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(SchedulerError::Cancelled { .. })));
    // The cancelled waiter must not have recorded a start
    assert_eq!(scheduler.window_len("cancel.test").await, 1);
}

#[tokio::test]
async fn test_already_cancelled_token_rejected_without_recording() {
    let scheduler = DomainScheduler::new(limit(100, 0));
    let (handle, token) = CancelToken::new();
    handle.cancel();

    let result = scheduler.acquire("precancel.test", &token).await;
    assert!(matches!(result, Err(SchedulerError::Cancelled { .. })));
    assert_eq!(scheduler.window_len("precancel.test").await, 0);
}

// ============================================================================
// with_throttle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_with_throttle_serializes_user_code() {
    let scheduler = std::sync::Arc::new(DomainScheduler::new(limit(100, 0)));
    let running = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let max_seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = scheduler.clone();
        let running = running.clone();
        let max_seen = max_seen.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancelToken::never();
            scheduler
                .with_throttle("serial.test", &cancel, || async {
                    let now = running.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                })
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_with_throttle_returns_value() {
    let scheduler = DomainScheduler::new(limit(100, 0));
    let cancel = CancelToken::never();

    let value = scheduler
        .with_throttle("value.test", &cancel, || async { 42 })
        .await
        .unwrap();
    assert_eq!(value, 42);
}
