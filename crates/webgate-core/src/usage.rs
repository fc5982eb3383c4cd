//! # Usage Counter
//!
//! Atomic per-tenant, per-UTC-day usage counters keyed by tier.
//!
//! The backend is pluggable: the in-memory map ships here, a remote atomic
//! counter store implements the same trait. Every increment is a single
//! backend round-trip; when the primary backend fails, the counter falls
//! back to the in-memory backend and logs the degradation once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use crate::{TenantId, Tier, Timestamp};

/// Counter records live this long after their first increment
pub const USAGE_TTL: Duration = Duration::from_secs(8 * 24 * 3600);

// ============================================================================
// Snapshot Types
// ============================================================================

/// Per-tier slice of a day's usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    pub requests: u64,
    pub units: u64,
}

/// One tenant-day of usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// UTC day key, `YYYY-MM-DD`
    pub day: String,

    pub requests: u64,
    pub units: u64,
    pub by_tier: BTreeMap<Tier, TierUsage>,

    /// When the record was first written; TTL anchors here and is not
    /// reset by later increments
    pub first_increment: Timestamp,
}

impl UsageSnapshot {
    fn empty(day: String, now: Timestamp) -> Self {
        Self {
            day,
            requests: 0,
            units: 0,
            by_tier: BTreeMap::new(),
            first_increment: now,
        }
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Error type for usage backends
#[derive(Debug, Clone, thiserror::Error)]
pub enum UsageError {
    #[error("usage backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Pluggable atomic counter store.
///
/// Implementations must make `increment` a single atomic round-trip; the
/// returned snapshot reflects the post-increment state.
#[async_trait]
pub trait UsageBackend: Send + Sync {
    /// Atomically add one request of `units` on `tier` for (tenant, day)
    async fn increment(
        &self,
        tenant: &TenantId,
        day: &str,
        tier: Tier,
        units: u64,
    ) -> Result<UsageSnapshot, UsageError>;

    /// Snapshot of one tenant-day; empty snapshot when absent
    async fn snapshot(&self, tenant: &TenantId, day: &str) -> Result<UsageSnapshot, UsageError>;

    /// Fast-path units total for one tenant-day
    async fn units(&self, tenant: &TenantId, day: &str) -> Result<u64, UsageError>;

    /// Inclusive day-range scan for billing export
    async fn range(
        &self,
        tenant: &TenantId,
        from_day: &str,
        to_day: &str,
    ) -> Result<Vec<UsageSnapshot>, UsageError>;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// Process-local backend; also the fallback target when a remote backend
/// degrades
#[derive(Debug, Default)]
pub struct InMemoryUsageBackend {
    records: Mutex<HashMap<(TenantId, String), UsageSnapshot>>,
}

impl InMemoryUsageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records past their TTL
    fn purge(records: &mut HashMap<(TenantId, String), UsageSnapshot>, now: Timestamp) {
        records.retain(|_, record| {
            now.duration_since(record.first_increment) < USAGE_TTL
        });
    }
}

#[async_trait]
impl UsageBackend for InMemoryUsageBackend {
    async fn increment(
        &self,
        tenant: &TenantId,
        day: &str,
        tier: Tier,
        units: u64,
    ) -> Result<UsageSnapshot, UsageError> {
        let now = Timestamp::now();
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Self::purge(&mut records, now);

        let record = records
            .entry((tenant.clone(), day.to_string()))
            .or_insert_with(|| UsageSnapshot::empty(day.to_string(), now));

        record.requests += 1;
        record.units += units;
        let slice = record.by_tier.entry(tier).or_default();
        slice.requests += 1;
        slice.units += units;

        Ok(record.clone())
    }

    async fn snapshot(&self, tenant: &TenantId, day: &str) -> Result<UsageSnapshot, UsageError> {
        let now = Timestamp::now();
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Self::purge(&mut records, now);
        Ok(records
            .get(&(tenant.clone(), day.to_string()))
            .cloned()
            .unwrap_or_else(|| UsageSnapshot::empty(day.to_string(), now)))
    }

    async fn units(&self, tenant: &TenantId, day: &str) -> Result<u64, UsageError> {
        self.snapshot(tenant, day).await.map(|s| s.units)
    }

    async fn range(
        &self,
        tenant: &TenantId,
        from_day: &str,
        to_day: &str,
    ) -> Result<Vec<UsageSnapshot>, UsageError> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let mut days: Vec<UsageSnapshot> = records
            .iter()
            .filter(|((t, day), _)| {
                t == tenant && day.as_str() >= from_day && day.as_str() <= to_day
            })
            .map(|(_, record)| record.clone())
            .collect();
        days.sort_by(|a, b| a.day.cmp(&b.day));
        Ok(days)
    }
}

// ============================================================================
// Counter
// ============================================================================

/// Usage counter with primary backend and in-memory fallback
pub struct UsageCounter {
    primary: Arc<dyn UsageBackend>,
    fallback: Arc<InMemoryUsageBackend>,
    degraded_logged: AtomicBool,
}

impl UsageCounter {
    /// Counter over the in-memory backend only
    pub fn in_memory() -> Self {
        let fallback = Arc::new(InMemoryUsageBackend::new());
        Self {
            primary: fallback.clone(),
            fallback,
            degraded_logged: AtomicBool::new(false),
        }
    }

    /// Counter over a remote backend with automatic in-memory fallback
    pub fn with_backend(primary: Arc<dyn UsageBackend>) -> Self {
        Self {
            primary,
            fallback: Arc::new(InMemoryUsageBackend::new()),
            degraded_logged: AtomicBool::new(false),
        }
    }

    fn note_degraded(&self, err: &UsageError) {
        if !self.degraded_logged.swap(true, Ordering::Relaxed) {
            warn!(error = %err, "usage backend degraded; falling back to in-memory counters");
        }
    }

    /// Record one request of `units` on `tier` for the tenant's current
    /// UTC day
    pub async fn record(
        &self,
        tenant: &TenantId,
        tier: Tier,
        units: u64,
    ) -> UsageSnapshot {
        let day = Timestamp::now().utc_day();
        match self.primary.increment(tenant, &day, tier, units).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.note_degraded(&e);
                self.fallback
                    .increment(tenant, &day, tier, units)
                    .await
                    .unwrap_or_else(|_| UsageSnapshot::empty(day, Timestamp::now()))
            }
        }
    }

    /// Units consumed so far today; the fast-path budget check
    pub async fn units_today(&self, tenant: &TenantId) -> u64 {
        let day = Timestamp::now().utc_day();
        match self.primary.units(tenant, &day).await {
            Ok(units) => units,
            Err(e) => {
                self.note_degraded(&e);
                self.fallback.units(tenant, &day).await.unwrap_or(0)
            }
        }
    }

    /// Today's full snapshot
    pub async fn today(&self, tenant: &TenantId) -> UsageSnapshot {
        let day = Timestamp::now().utc_day();
        match self.primary.snapshot(tenant, &day).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.note_degraded(&e);
                self.fallback
                    .snapshot(tenant, &day)
                    .await
                    .unwrap_or_else(|_| UsageSnapshot::empty(day, Timestamp::now()))
            }
        }
    }

    /// Inclusive day-range scan
    pub async fn range(
        &self,
        tenant: &TenantId,
        from_day: &str,
        to_day: &str,
    ) -> Vec<UsageSnapshot> {
        match self.primary.range(tenant, from_day, to_day).await {
            Ok(days) => days,
            Err(e) => {
                self.note_degraded(&e);
                self.fallback
                    .range(tenant, from_day, to_day)
                    .await
                    .unwrap_or_default()
            }
        }
    }
}

impl std::fmt::Debug for UsageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageCounter")
            .field("degraded", &self.degraded_logged.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
