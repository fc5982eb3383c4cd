//! # Per-Domain Scheduler
//!
//! Serializes and throttles outbound requests per target domain.
//!
//! Each domain carries a sliding one-minute window of request timestamps and
//! a FIFO gate guaranteeing at most one in-flight acquisition. The gate is
//! held only inside [`DomainScheduler::acquire`]; user code never runs under
//! it. [`DomainScheduler::with_throttle`] layers a second per-domain lock on
//! top when callers need their own critical section serialized, so `acquire`
//! can take its gate without deadlocking.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::CancelToken;

/// Sliding window width for the requests-per-minute budget
const WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// Rate Limit Configuration
// ============================================================================

/// Per-domain throttle parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainRateLimit {
    /// Maximum request starts inside any sliding 60s window
    pub requests_per_minute: u32,

    /// Minimum spacing between consecutive request starts
    pub min_delay: Duration,
}

impl Default for DomainRateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            min_delay: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("acquisition cancelled while waiting for domain '{domain}'")]
    Cancelled { domain: String },
}

// ============================================================================
// Internal State
// ============================================================================

/// Per-domain window plus the pair of locks described in the module docs
#[derive(Debug)]
struct DomainState {
    /// FIFO gate; held across the throttle wait inside `acquire` only
    gate: Mutex<RequestHistory>,

    /// Serializes caller critical sections in `with_throttle`
    serial: Mutex<()>,
}

impl DomainState {
    fn new() -> Self {
        Self {
            gate: Mutex::new(RequestHistory::default()),
            serial: Mutex::new(()),
        }
    }
}

#[derive(Debug, Default)]
struct RequestHistory {
    /// Request start instants within the last minute, oldest first
    starts: VecDeque<Instant>,
}

impl RequestHistory {
    fn purge(&mut self, now: Instant) {
        while let Some(oldest) = self.starts.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Delay required before the next start may be recorded
    fn required_delay(&self, now: Instant, limit: &DomainRateLimit) -> Duration {
        let mut delay = Duration::ZERO;

        if self.starts.len() >= limit.requests_per_minute as usize {
            if let Some(oldest) = self.starts.front() {
                let until_expiry = WINDOW.saturating_sub(now.duration_since(*oldest));
                delay = delay.max(until_expiry);
            }
        }

        if let Some(last) = self.starts.back() {
            let since_last = now.duration_since(*last);
            delay = delay.max(limit.min_delay.saturating_sub(since_last));
        }

        delay
    }
}

// ============================================================================
// Domain Scheduler
// ============================================================================

/// Throttling scheduler shared by every fetch path
#[derive(Debug)]
pub struct DomainScheduler {
    default_limit: DomainRateLimit,
    limits: std::sync::RwLock<HashMap<String, DomainRateLimit>>,
    domains: std::sync::Mutex<HashMap<String, Arc<DomainState>>>,
}

impl DomainScheduler {
    /// Create a scheduler with the given default bucket
    pub fn new(default_limit: DomainRateLimit) -> Self {
        Self {
            default_limit,
            limits: std::sync::RwLock::new(HashMap::new()),
            domains: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the rate limit for a domain
    pub fn register_limit(&self, domain: impl Into<String>, limit: DomainRateLimit) {
        let key = normalize_domain(&domain.into());
        self.limits
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, limit);
    }

    /// Effective limit for a domain: exact match, then registered parent
    /// domains, then the default bucket
    pub fn limit_for(&self, domain: &str) -> DomainRateLimit {
        let key = normalize_domain(domain);
        let limits = self
            .limits
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut candidate = key.as_str();
        loop {
            if let Some(limit) = limits.get(candidate) {
                return *limit;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return self.default_limit,
            }
        }
    }

    /// Wait until the domain's throttle admits a new request, then record
    /// its start.
    ///
    /// The FIFO gate guarantees waiters are admitted in arrival order. A
    /// cancelled waiter records no timestamp and leaves the window
    /// untouched.
    #[instrument(skip(self, cancel))]
    pub async fn acquire(&self, domain: &str, cancel: &CancelToken) -> Result<(), SchedulerError> {
        let key = normalize_domain(domain);
        let limit = self.limit_for(&key);
        let state = self.state_for(&key);

        let mut history = state.gate.lock().await;
        let now = Instant::now();
        history.purge(now);

        let delay = history.required_delay(now, &limit);
        if !delay.is_zero() {
            debug!(domain = %key, delay_ms = delay.as_millis() as u64, "throttling");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(SchedulerError::Cancelled { domain: key });
                }
            }
        } else if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled { domain: key });
        }

        let start = Instant::now();
        history.purge(start);
        history.starts.push_back(start);
        Ok(())
    }

    /// Serialize `work` against other `with_throttle` callers on the same
    /// domain, acquiring the throttle first.
    ///
    /// This is the only API that holds a lock across user code; `acquire`
    /// itself never does.
    pub async fn with_throttle<F, Fut, T>(
        &self,
        domain: &str,
        cancel: &CancelToken,
        work: F,
    ) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let key = normalize_domain(domain);
        let state = self.state_for(&key);

        let _serial = state.serial.lock().await;
        self.acquire(&key, cancel).await?;
        Ok(work().await)
    }

    /// Number of request starts currently inside the domain's window
    pub async fn window_len(&self, domain: &str) -> usize {
        let key = normalize_domain(domain);
        let state = self.state_for(&key);
        let mut history = state.gate.lock().await;
        history.purge(Instant::now());
        history.starts.len()
    }

    fn state_for(&self, key: &str) -> Arc<DomainState> {
        let mut domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        domains
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone()
    }
}

impl Default for DomainScheduler {
    fn default() -> Self {
        Self::new(DomainRateLimit::default())
    }
}

/// Normalize a domain key: lowercase, strip one leading `www.`
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    lowered
        .strip_prefix("www.")
        .unwrap_or(&lowered)
        .to_string()
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
