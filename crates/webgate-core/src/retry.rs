//! # Retry Engine
//!
//! Classifies fetch failures and decides retry, escalation, or abort.
//!
//! The engine never sleeps. Every decision carries the delay for the caller
//! to drive, so cancellation stays cooperative: a caller that observes its
//! cancel token during the sleep simply abandons the decision.

use rand::Rng;
use std::time::Duration;

use crate::FailureCategory;

// ============================================================================
// Strategy Table
// ============================================================================

/// How a failure category should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Surface immediately; retrying cannot help
    None,

    /// Wait with exponential backoff, then retry the same tier
    Backoff,

    /// Retry the same tier with a longer timeout budget
    IncreaseTimeout,

    /// Do not retry here; the fetcher should escalate to the next tier
    TryAlternative,
}

/// Backoff parameters for one failure category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryProfile {
    pub strategy: RetryStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub multiplier: f64,
}

impl RetryProfile {
    const fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries: 0,
            multiplier: 1.0,
        }
    }

    const fn try_alternative() -> Self {
        Self {
            strategy: RetryStrategy::TryAlternative,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries: 0,
            multiplier: 1.0,
        }
    }

    const fn backoff(initial: Duration, max: Duration, retries: u32, multiplier: f64) -> Self {
        Self {
            strategy: RetryStrategy::Backoff,
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            multiplier,
        }
    }
}

/// Profile table for every failure category.
///
/// `rate_limited` backs off from a full minute because the window that
/// tripped it is a minute wide; `timeout` grows gently and asks the caller
/// to stretch its own budget instead.
pub fn profile_for(category: FailureCategory) -> RetryProfile {
    match category {
        FailureCategory::AuthRequired => RetryProfile::none(),
        FailureCategory::RateLimited => RetryProfile::backoff(
            Duration::from_secs(60),
            Duration::from_secs(300),
            3,
            2.0,
        ),
        FailureCategory::WrongEndpoint => RetryProfile::none(),
        FailureCategory::ServerError => RetryProfile::backoff(
            Duration::from_secs(5),
            Duration::from_secs(60),
            2,
            2.0,
        ),
        FailureCategory::Timeout => RetryProfile {
            strategy: RetryStrategy::IncreaseTimeout,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: 2,
            multiplier: 1.5,
        },
        FailureCategory::ParseError
        | FailureCategory::ValidationFailed
        | FailureCategory::ContentTooShort => RetryProfile::try_alternative(),
        FailureCategory::NetworkError => RetryProfile::backoff(
            Duration::from_secs(2),
            Duration::from_secs(30),
            3,
            2.0,
        ),
        FailureCategory::Unknown => RetryProfile::try_alternative(),
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// Outcome of consulting the engine after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, then retry the same tier. `increase_timeout` asks the
    /// caller to stretch its per-attempt timeout before retrying.
    Retry {
        delay: Duration,
        increase_timeout: bool,
    },

    /// Escalate to the next tier without waiting
    TryAlternative,

    /// Surface the classified failure to the caller
    Abort,
}

// ============================================================================
// Retry Engine
// ============================================================================

/// Stateless failure-to-decision mapper
#[derive(Debug, Clone)]
pub struct RetryEngine {
    jitter_fraction: f64,
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self {
            jitter_fraction: 0.3,
        }
    }
}

impl RetryEngine {
    /// Create an engine with the standard ±30% jitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable jitter; deterministic tests only
    pub fn without_jitter(mut self) -> Self {
        self.jitter_fraction = 0.0;
        self
    }

    /// Classify a transport-level error from the HTTP client
    pub fn classify_transport(err: &reqwest::Error) -> FailureCategory {
        if err.is_timeout() {
            FailureCategory::Timeout
        } else if err.is_connect() || err.is_request() {
            FailureCategory::NetworkError
        } else if err.is_decode() {
            FailureCategory::ParseError
        } else {
            FailureCategory::Unknown
        }
    }

    /// Decide what to do about the `attempt`-th retry (1-based) of a failure
    /// in `category`.
    ///
    /// `attempt = 1` means one failure has happened and the caller asks
    /// whether a first retry is warranted.
    pub fn decide(&self, category: FailureCategory, attempt: u32) -> RetryDecision {
        let profile = profile_for(category);

        match profile.strategy {
            RetryStrategy::None => RetryDecision::Abort,
            RetryStrategy::TryAlternative => RetryDecision::TryAlternative,
            RetryStrategy::Backoff | RetryStrategy::IncreaseTimeout => {
                if attempt == 0 || attempt > profile.max_retries {
                    return RetryDecision::Abort;
                }
                RetryDecision::Retry {
                    delay: self.backoff_delay(&profile, attempt),
                    increase_timeout: profile.strategy == RetryStrategy::IncreaseTimeout,
                }
            }
        }
    }

    /// Exponential delay for the given retry attempt, clamped then jittered
    fn backoff_delay(&self, profile: &RetryProfile, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = profile.initial_delay.as_secs_f64() * profile.multiplier.powi(exponent);
        let clamped = base.min(profile.max_delay.as_secs_f64());

        let jittered = if self.jitter_fraction > 0.0 {
            let spread = clamped * self.jitter_fraction;
            let jitter = rand::thread_rng().gen_range(-spread..=spread);
            (clamped + jitter).max(0.0)
        } else {
            clamped
        };

        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
