//! # Anti-Pattern Store
//!
//! Hardens repeated failures into suppressions the matcher consults.
//!
//! Failures accumulate in a sliding 24-hour window keyed by (pattern,
//! domain, category). Crossing the threshold creates an anti-pattern whose
//! action and lifetime depend on the category; the registry drops match
//! candidates that a currently-active suppression covers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use super::AntiPattern;
use crate::{AntiPatternId, FailureCategory, PatternId, Timestamp};

/// Sliding window width for failure accumulation
const FAILURE_WINDOW: Duration = Duration::from_secs(24 * 3600);

// ============================================================================
// Actions and Configuration
// ============================================================================

/// What the fetcher should do about a suppressed pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    None,
    Backoff,
    SkipDomain,
    TryAlternative,
    IncreaseTimeout,
}

/// Anti-pattern store configuration
#[derive(Debug, Clone, Copy)]
pub struct AntiPatternConfig {
    /// Failures of one category on one domain needed inside the window
    pub min_failures: usize,
}

impl Default for AntiPatternConfig {
    fn default() -> Self {
        Self { min_failures: 3 }
    }
}

/// Suppression lifetime and action per failure category
fn suppression_for(category: FailureCategory) -> (RecommendedAction, Duration) {
    match category {
        // A login wall does not go away on its own
        FailureCategory::AuthRequired => (RecommendedAction::SkipDomain, Duration::ZERO),
        FailureCategory::RateLimited => (RecommendedAction::Backoff, Duration::from_secs(3600)),
        FailureCategory::WrongEndpoint => {
            (RecommendedAction::SkipDomain, Duration::from_secs(6 * 3600))
        }
        _ => (
            RecommendedAction::TryAlternative,
            Duration::from_secs(6 * 3600),
        ),
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FailureKey {
    pattern_id: PatternId,
    domain: String,
    category: FailureCategory,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Recent failure timestamps per (pattern, domain, category)
    windows: HashMap<FailureKey, VecDeque<Timestamp>>,

    /// All suppressions, active and expired; expired entries are pruned
    /// opportunistically
    anti_patterns: HashMap<AntiPatternId, AntiPattern>,
}

/// Thread-safe anti-pattern store
#[derive(Debug)]
pub struct AntiPatternStore {
    config: AntiPatternConfig,
    state: Mutex<StoreState>,
}

impl AntiPatternStore {
    /// Create an empty store
    pub fn new(config: AntiPatternConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Record one failure; returns a new anti-pattern when the threshold for
    /// (pattern, domain, category) is crossed.
    ///
    /// An existing active suppression for the same key absorbs the failure
    /// (its count advances) without creating a duplicate.
    pub fn record_failure(
        &self,
        pattern_id: PatternId,
        domain: &str,
        category: FailureCategory,
        reason: &str,
    ) -> Option<AntiPattern> {
        let now = Timestamp::now();
        let key = FailureKey {
            pattern_id,
            domain: domain.to_string(),
            category,
        };

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        // Advance an existing active suppression instead of duplicating it
        if let Some(existing) = state.anti_patterns.values_mut().find(|anti| {
            anti.is_active(now)
                && anti.source_pattern_id == Some(pattern_id)
                && anti.failure_category == category
                && anti.domains.contains(domain)
        }) {
            existing.failure_count += 1;
            existing.last_failure = now;
            return None;
        }

        let window = state.windows.entry(key.clone()).or_default();
        let cutoff = now.subtract_duration(FAILURE_WINDOW);
        while let Some(front) = window.front() {
            if *front < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
        window.push_back(now);

        if window.len() < self.config.min_failures {
            return None;
        }

        let failure_count = window.len() as u64;
        state.windows.remove(&key);

        let (action, lifetime) = suppression_for(category);
        let expires_at_ms = if lifetime.is_zero() {
            0
        } else {
            now.add_duration(lifetime).unix_ms()
        };

        let anti = AntiPattern {
            id: AntiPatternId::new(),
            source_pattern_id: Some(pattern_id),
            domains: BTreeSet::from([domain.to_string()]),
            url_patterns: Vec::new(),
            failure_category: category,
            reason: reason.to_string(),
            recommended_action: action,
            suppression_duration_ms: lifetime.as_millis() as u64,
            created_at: now,
            expires_at_ms,
            failure_count,
            last_failure: now,
        };

        info!(
            anti_pattern_id = %anti.id,
            pattern_id = %pattern_id,
            domain,
            category = %category,
            action = ?action,
            "anti-pattern created"
        );

        state.anti_patterns.insert(anti.id, anti.clone());
        Some(anti)
    }

    /// Whether any active suppression covers (pattern, domain) at `now`
    pub fn is_suppressed(&self, pattern_id: PatternId, domain: &str, now: Timestamp) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.anti_patterns.values().any(|anti| {
            anti.is_active(now)
                && anti.source_pattern_id == Some(pattern_id)
                && anti.domains.contains(domain)
        })
    }

    /// Active suppression ids naming `pattern_id`
    pub fn active_for(&self, pattern_id: PatternId, now: Timestamp) -> Vec<AntiPatternId> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .anti_patterns
            .values()
            .filter(|anti| anti.is_active(now) && anti.source_pattern_id == Some(pattern_id))
            .map(|anti| anti.id)
            .collect()
    }

    /// Remove one suppression (manual override)
    pub fn clear(&self, id: AntiPatternId) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.anti_patterns.remove(&id).is_some()
    }

    /// Drop expired suppressions and stale window entries
    pub fn purge_expired(&self) {
        let now = Timestamp::now();
        let cutoff = now.subtract_duration(FAILURE_WINDOW);
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        state.anti_patterns.retain(|_, anti| anti.is_active(now));
        state.windows.retain(|_, window| {
            while let Some(front) = window.front() {
                if *front < cutoff {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
    }

    /// Snapshot of every stored suppression
    pub fn list(&self) -> Vec<AntiPattern> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<_> = state.anti_patterns.values().cloned().collect();
        all.sort_by_key(|anti| anti.created_at);
        all
    }

    /// Replace store contents from persisted state
    pub fn restore(&self, anti_patterns: Vec<AntiPattern>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.anti_patterns = anti_patterns
            .into_iter()
            .map(|anti| (anti.id, anti))
            .collect();
    }
}

impl Default for AntiPatternStore {
    fn default() -> Self {
        Self::new(AntiPatternConfig::default())
    }
}

#[cfg(test)]
#[path = "anti_pattern_tests.rs"]
mod tests;
