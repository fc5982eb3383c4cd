//! # Learned Checks
//!
//! Per-domain check attribution with rolling success rates.
//!
//! When verification fails for a request and an identical request later
//! succeeds, the check set that passed is credited to the domain. Checks
//! whose success rate clears the application threshold are auto-applied to
//! subsequent requests on that domain.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{CheckSeverity, CheckSpec, ContentCheckKind};

// ============================================================================
// Configuration
// ============================================================================

/// Learned check store configuration
#[derive(Debug, Clone, Copy)]
pub struct LearnedCheckStoreConfig {
    /// Success rate a check needs before it is auto-applied
    pub apply_threshold: f64,

    /// Minimum attributions before the rate is trusted
    pub min_attempts: u64,

    /// Bound on remembered pending failures
    pub max_pending: usize,
}

impl Default for LearnedCheckStoreConfig {
    fn default() -> Self {
        Self {
            apply_threshold: 0.7,
            min_attempts: 3,
            max_pending: 1024,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Default, Clone)]
struct CheckScore {
    successes: u64,
    attempts: u64,
}

impl CheckScore {
    fn rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    /// (domain, check name) → rolling score
    scores: HashMap<(String, String), CheckScore>,

    /// Request fingerprints whose last verification failed
    pending_failures: HashSet<String>,
}

/// Thread-safe learned check store
#[derive(Debug)]
pub struct LearnedCheckStore {
    config: LearnedCheckStoreConfig,
    state: Mutex<StoreState>,
}

impl LearnedCheckStore {
    /// Create an empty store
    pub fn new(config: LearnedCheckStoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Remember that verification failed for this request fingerprint
    pub fn note_failure(&self, fingerprint: &str) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.pending_failures.len() >= self.config.max_pending {
            state.pending_failures.clear();
        }
        state.pending_failures.insert(fingerprint.to_string());
    }

    /// Credit a successful verification.
    ///
    /// Attribution only happens when the same fingerprint failed earlier;
    /// `passed_checks` are the check names that held on the success.
    pub fn note_success(&self, fingerprint: &str, domain: &str, passed_checks: &[String]) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.pending_failures.remove(fingerprint) {
            return;
        }
        for name in passed_checks {
            let score = state
                .scores
                .entry((domain.to_string(), name.clone()))
                .or_default();
            score.attempts += 1;
            score.successes += 1;
        }
    }

    /// Record that an auto-applied check failed on the domain, eroding its
    /// rate
    pub fn note_check_failure(&self, domain: &str, check_name: &str) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let score = state
            .scores
            .entry((domain.to_string(), check_name.to_string()))
            .or_default();
        score.attempts += 1;
    }

    /// Checks worth auto-applying on this domain.
    ///
    /// Only check names map back to concrete specs the store knows how to
    /// rebuild; unknown names are reported but not materialized.
    pub fn checks_for(&self, domain: &str) -> Vec<CheckSpec> {
        self.check_names_for(domain)
            .into_iter()
            .filter_map(|name| rebuild_check(&name))
            .collect()
    }

    /// Names of checks above the application threshold for the domain
    pub fn check_names_for(&self, domain: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = state
            .scores
            .iter()
            .filter(|((d, _), score)| {
                d == domain
                    && score.attempts >= self.config.min_attempts
                    && score.rate() >= self.config.apply_threshold
            })
            .map(|((_, name), _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Rolling rate of one (domain, check) pair
    pub fn rate_of(&self, domain: &str, check_name: &str) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .scores
            .get(&(domain.to_string(), check_name.to_string()))
            .map(CheckScore::rate)
    }
}

impl Default for LearnedCheckStore {
    fn default() -> Self {
        Self::new(LearnedCheckStoreConfig::default())
    }
}

/// Rebuild a concrete spec from a learned check name.
///
/// The built-in naming convention is the reverse mapping; names outside it
/// cannot be materialized.
fn rebuild_check(name: &str) -> Option<CheckSpec> {
    if let Some(raw) = name.strip_prefix("excludes_") {
        return Some(CheckSpec::Action {
            name: name.to_string(),
            kind: super::ActionCheckKind::ExcludesText {
                needle: raw.replace('_', " "),
            },
            severity: CheckSeverity::Error,
        });
    }
    if name == "content_min_length" {
        return Some(CheckSpec::Content {
            name: name.to_string(),
            field: "content".to_string(),
            kind: ContentCheckKind::MinLength { chars: 50 },
            severity: CheckSeverity::Error,
        });
    }
    if name == "content_substantial_length" {
        return Some(CheckSpec::Content {
            name: name.to_string(),
            field: "content".to_string(),
            kind: ContentCheckKind::MinLength { chars: 100 },
            severity: CheckSeverity::Warning,
        });
    }
    None
}

#[cfg(test)]
#[path = "learned_tests.rs"]
mod tests;
