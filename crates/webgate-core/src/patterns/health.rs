//! # Pattern Health Monitor
//!
//! Rolling success-rate tracking and coarse health classification.
//!
//! Each recorded outcome lands in a bounded per-pattern window. Once the
//! window holds enough samples the monitor classifies the pattern and, on a
//! classification change, emits a single transition notification carrying
//! suggested operator actions derived from the failure-category mix.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::{HealthSnapshot, HealthStatus, PatternHealth};
use crate::{FailureCategory, PatternId, Timestamp};

// ============================================================================
// Configuration
// ============================================================================

/// Health monitor configuration
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    /// Outcome window used to compute the rolling success rate
    pub window_size: usize,

    /// Minimum samples before classification runs
    pub min_sample_size: u32,

    /// Maximum snapshots retained per pattern
    pub max_snapshots: usize,

    /// Snapshots older than this are pruned
    pub snapshot_retention: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_sample_size: 5,
            max_snapshots: 30,
            snapshot_retention: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

// ============================================================================
// Transition Notifications
// ============================================================================

/// Emitted exactly once per status change
#[derive(Debug, Clone, PartialEq)]
pub struct HealthTransition {
    pub pattern_id: PatternId,
    pub previous_status: HealthStatus,
    pub new_status: HealthStatus,
    pub suggested_actions: Vec<String>,
}

// ============================================================================
// Internal State
// ============================================================================

#[derive(Debug)]
struct PatternWindow {
    /// Recent outcomes, oldest first; true = success
    outcomes: VecDeque<bool>,

    /// Failure categories observed inside the current window
    categories: VecDeque<FailureCategory>,

    consecutive_failures: u32,
    health: PatternHealth,
}

impl PatternWindow {
    fn new(now: Timestamp) -> Self {
        Self {
            outcomes: VecDeque::new(),
            categories: VecDeque::new(),
            consecutive_failures: 0,
            health: PatternHealth {
                status: HealthStatus::Healthy,
                current_success_rate: 1.0,
                history: VecDeque::new(),
                last_health_check: now,
                degradation_detected_at: None,
                consecutive_failures: 0,
            },
        }
    }

    fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        successes as f64 / self.outcomes.len() as f64
    }
}

/// Classification thresholds from the rolling rate and failure streak
fn classify(rate: f64, consecutive_failures: u32) -> HealthStatus {
    if rate < 0.2 {
        HealthStatus::Broken
    } else if rate < 0.5 {
        HealthStatus::Failing
    } else if rate < 0.7 || consecutive_failures >= 3 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Operator guidance derived from the dominant failure categories
fn suggested_actions(categories: &VecDeque<FailureCategory>) -> Vec<String> {
    let mut counts: HashMap<FailureCategory, usize> = HashMap::new();
    for category in categories {
        *counts.entry(*category).or_insert(0) += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(3)
        .map(|(category, _)| match category {
            FailureCategory::AuthRequired => {
                "endpoint now requires authentication; consider skipping the domain".to_string()
            }
            FailureCategory::RateLimited => {
                "reduce request rate or raise the per-domain throttle".to_string()
            }
            FailureCategory::WrongEndpoint => {
                "endpoint template no longer resolves; re-learn from a fresh fetch".to_string()
            }
            FailureCategory::ServerError => {
                "upstream is erroring; back off and re-check later".to_string()
            }
            FailureCategory::Timeout => "increase the per-attempt timeout budget".to_string(),
            FailureCategory::ParseError | FailureCategory::ValidationFailed => {
                "response shape changed; refresh the content mapping".to_string()
            }
            FailureCategory::ContentTooShort => {
                "mapped content is thin; verify the body mapping path".to_string()
            }
            FailureCategory::NetworkError => {
                "transient network failures; verify connectivity".to_string()
            }
            FailureCategory::Unknown => "inspect recent failure records".to_string(),
        })
        .collect()
}

// ============================================================================
// Monitor
// ============================================================================

/// Thread-safe health monitor for every pattern
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    windows: Mutex<HashMap<PatternId, PatternWindow>>,
}

impl HealthMonitor {
    /// Create an empty monitor
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one application outcome.
    ///
    /// Returns a transition when the classification changed; classification
    /// only runs once the window holds `min_sample_size` outcomes.
    pub fn record(
        &self,
        pattern_id: PatternId,
        success: bool,
        category: Option<FailureCategory>,
    ) -> Option<HealthTransition> {
        let now = Timestamp::now();
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let window = windows
            .entry(pattern_id)
            .or_insert_with(|| PatternWindow::new(now));

        window.outcomes.push_back(success);
        while window.outcomes.len() > self.config.window_size {
            window.outcomes.pop_front();
        }

        if success {
            window.consecutive_failures = 0;
        } else {
            window.consecutive_failures += 1;
            if let Some(category) = category {
                window.categories.push_back(category);
                while window.categories.len() > self.config.window_size {
                    window.categories.pop_front();
                }
            }
        }

        let rate = window.success_rate();
        let sample_size = window.outcomes.len() as u32;

        window.health.current_success_rate = rate;
        window.health.consecutive_failures = window.consecutive_failures;
        window.health.last_health_check = now;

        window.health.history.push_back(HealthSnapshot {
            timestamp: now,
            success_rate: rate,
            sample_size,
        });
        let retention_cutoff = now.subtract_duration(self.config.snapshot_retention);
        while let Some(front) = window.health.history.front() {
            if window.health.history.len() > self.config.max_snapshots
                || front.timestamp < retention_cutoff
            {
                window.health.history.pop_front();
            } else {
                break;
            }
        }

        if sample_size < self.config.min_sample_size {
            return None;
        }

        let previous = window.health.status;
        let new_status = classify(rate, window.consecutive_failures);
        if new_status == previous {
            return None;
        }

        window.health.status = new_status;
        if previous == HealthStatus::Healthy {
            window.health.degradation_detected_at = Some(now);
        } else if new_status == HealthStatus::Healthy {
            window.health.degradation_detected_at = None;
        }

        debug!(
            pattern_id = %pattern_id,
            previous = %previous,
            new = %new_status,
            rate,
            "pattern health transition"
        );

        Some(HealthTransition {
            pattern_id,
            previous_status: previous,
            new_status,
            suggested_actions: suggested_actions(&window.categories),
        })
    }

    /// Snapshot of one pattern's health, if it has been observed
    pub fn health_of(&self, pattern_id: PatternId) -> Option<PatternHealth> {
        let windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        windows.get(&pattern_id).map(|w| w.health.clone())
    }

    /// Drop tracking state for a pattern (archival, deletion)
    pub fn forget(&self, pattern_id: PatternId) {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        windows.remove(&pattern_id);
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthMonitorConfig::default())
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
