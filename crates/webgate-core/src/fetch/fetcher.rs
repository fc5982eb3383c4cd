//! # Tiered Fetcher
//!
//! Chooses a tier plan, executes it, verifies the candidate, and escalates
//! on failure under retry-engine guidance.
//!
//! Tier order: a high-confidence pattern match runs first as the
//! intelligence tier, then the lightweight HTTP tier, then the rendered
//! tier, capped by the request's `max_cost_tier`. Every attempt passes
//! through the per-domain scheduler before touching the network.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{
    FetchContent, FetchOptions, FetchResult, LightweightTier, OnFailure, RenderedTier,
    TierError, TierOutcome,
};
use crate::patterns::{MappedContent, PatternMatch, PatternRegistry};
use crate::retry::{RetryDecision, RetryEngine};
use crate::scheduler::{normalize_domain, DomainScheduler};
use crate::verify::{builtin_checks, LearnedCheckStore, VerificationReport, Verifier};
use crate::{CancelToken, FailureCategory, PatternId, Tier};

// ============================================================================
// Configuration and Results
// ============================================================================

/// Fetcher tuning knobs
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Pattern confidence needed to lead with the intelligence tier
    pub pattern_confidence_floor: f64,

    /// Cap applied when the request carries none
    pub default_max_tier: Tier,

    /// Multiplier applied to the attempt timeout when the retry engine
    /// asks for a longer budget
    pub timeout_growth: f64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            pattern_confidence_floor: 0.8,
            default_max_tier: Tier::Playwright,
            timeout_growth: 1.5,
        }
    }
}

/// Successful fetch plus the telemetry the coordinator needs
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub result: FetchResult,
    pub pattern_id: Option<PatternId>,
    pub report_passed: bool,
    pub passed_check_names: Vec<String>,
}

/// Terminal fetch failure, already categorized
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch failed ({category}): {message}")]
pub struct FetchFailure {
    pub category: FailureCategory,
    pub message: String,
    pub pattern_id: Option<PatternId>,
    pub tiers_attempted: Vec<Tier>,
    pub decision_trace: Option<Vec<String>>,
}

// ============================================================================
// Fetcher
// ============================================================================

/// Tier-selecting fetcher
pub struct TieredFetcher {
    config: FetcherConfig,
    registry: Arc<PatternRegistry>,
    scheduler: Arc<DomainScheduler>,
    retry: RetryEngine,
    lightweight: Arc<dyn LightweightTier>,
    rendered: Option<Arc<dyn RenderedTier>>,
    verifier: Verifier,
    learned_checks: Arc<LearnedCheckStore>,
}

impl TieredFetcher {
    /// Assemble a fetcher from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FetcherConfig,
        registry: Arc<PatternRegistry>,
        scheduler: Arc<DomainScheduler>,
        retry: RetryEngine,
        lightweight: Arc<dyn LightweightTier>,
        rendered: Option<Arc<dyn RenderedTier>>,
        verifier: Verifier,
        learned_checks: Arc<LearnedCheckStore>,
    ) -> Self {
        Self {
            config,
            registry,
            scheduler,
            retry,
            lightweight,
            rendered,
            verifier,
            learned_checks,
        }
    }

    /// Tier plan for a URL: which tiers will run, in order, and with which
    /// pattern match for the intelligence tier
    pub fn plan(&self, url: &str, options: &FetchOptions) -> Vec<(Tier, Option<PatternMatch>)> {
        let cap = options.max_cost_tier.unwrap_or(self.config.default_max_tier);
        let mut plan = Vec::new();

        if cap >= Tier::Intelligence {
            if let Some(top) = self.registry.match_url(url).into_iter().next() {
                if top.confidence >= self.config.pattern_confidence_floor {
                    plan.push((Tier::Intelligence, Some(top)));
                }
            }
        }
        if cap >= Tier::Lightweight {
            plan.push((Tier::Lightweight, None));
        }
        if cap >= Tier::Playwright && self.rendered.is_some() {
            plan.push((Tier::Playwright, None));
        }
        plan
    }

    /// Cost in units of the first tier the plan would run; used for the
    /// budget pre-check
    pub fn planned_cost(&self, url: &str, options: &FetchOptions) -> u64 {
        self.plan(url, options)
            .first()
            .map(|(tier, _)| tier.cost_units())
            .unwrap_or(Tier::Lightweight.cost_units())
    }

    /// Execute the plan for one URL.
    #[instrument(skip(self, options, cancel))]
    pub async fn execute(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancelToken,
    ) -> Result<FetchSuccess, FetchFailure> {
        let started = std::time::Instant::now();
        let domain = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_domain))
            .unwrap_or_default();

        let mut trace: Option<Vec<String>> = options.include_decision_trace.then(Vec::new);
        let plan = self.plan(url, options);
        if let Some(trace) = trace.as_mut() {
            let tiers: Vec<&str> = plan.iter().map(|(t, _)| t.as_str()).collect();
            trace.push(format!("tier plan: [{}]", tiers.join(", ")));
        }

        let mut checks = builtin_checks(options.verification);
        let learned = self.learned_checks.checks_for(&domain);
        if !learned.is_empty() {
            if let Some(trace) = trace.as_mut() {
                trace.push(format!(
                    "applying {} learned check(s) for {}",
                    learned.len(),
                    domain
                ));
            }
            checks.extend(learned);
        }

        let mut attempted: Vec<Tier> = Vec::new();
        let mut last_failure: Option<(FailureCategory, String, Option<PatternId>)> = None;

        for (tier, matched) in plan {
            let pattern_id = matched.as_ref().map(|m| m.pattern.id);
            let mut attempt: u32 = 1;
            let mut timeout = tier.latency_budget();
            let mut verification_retried = false;

            if !attempted.contains(&tier) {
                attempted.push(tier);
            }

            'tier: loop {
                if cancel.is_cancelled() {
                    return Err(self.failure(
                        FailureCategory::Timeout,
                        "fetch cancelled".to_string(),
                        pattern_id,
                        &attempted,
                        trace,
                    ));
                }

                if self.scheduler.acquire(&domain, cancel).await.is_err() {
                    return Err(self.failure(
                        FailureCategory::Timeout,
                        "fetch cancelled while throttling".to_string(),
                        pattern_id,
                        &attempted,
                        trace,
                    ));
                }

                let outcome = self
                    .run_tier(tier, matched.as_ref(), url, options, timeout, cancel)
                    .await;

                match outcome {
                    Ok(tier_outcome) => {
                        let candidate = self.assemble(
                            url,
                            tier,
                            &attempted,
                            tier_outcome,
                            started.elapsed(),
                        );
                        let report = self
                            .verifier
                            .verify(&candidate, &checks, None, options.on_failure)
                            .await;

                        if let Some(trace) = trace.as_mut() {
                            trace.push(format!(
                                "tier {} fetched; verification {} (confidence {:.2})",
                                tier,
                                if report.passed { "passed" } else { "failed" },
                                report.confidence
                            ));
                        }

                        if report.passed || report.on_failure == OnFailure::Report {
                            return Ok(self.success(candidate, pattern_id, report, trace));
                        }

                        // Verification failed: decide between same-tier
                        // retry and escalation
                        let category = report.failure_category();
                        if report.on_failure == OnFailure::Retry && !verification_retried {
                            verification_retried = true;
                            if let Some(trace) = trace.as_mut() {
                                trace.push(format!(
                                    "verification failed ({}); re-running {}",
                                    category, tier
                                ));
                            }
                            continue 'tier;
                        }

                        last_failure =
                            Some((category, format!("verification failed on {}", tier), pattern_id));
                        break 'tier;
                    }
                    Err(tier_error) => {
                        let decision = self.retry.decide(tier_error.category, attempt);
                        if let Some(trace) = trace.as_mut() {
                            trace.push(format!(
                                "tier {} failed ({}): {:?}",
                                tier, tier_error.category, decision
                            ));
                        }

                        match decision {
                            RetryDecision::Retry {
                                delay,
                                increase_timeout,
                            } => {
                                tokio::select! {
                                    _ = tokio::time::sleep(delay) => {}
                                    _ = cancel.cancelled() => {
                                        return Err(self.failure(
                                            FailureCategory::Timeout,
                                            "fetch cancelled during backoff".to_string(),
                                            pattern_id,
                                            &attempted,
                                            trace,
                                        ));
                                    }
                                }
                                if increase_timeout {
                                    timeout = timeout.mul_f64(self.config.timeout_growth);
                                }
                                attempt += 1;
                                continue 'tier;
                            }
                            RetryDecision::TryAlternative => {
                                last_failure = Some((
                                    tier_error.category,
                                    tier_error.message,
                                    pattern_id,
                                ));
                                break 'tier;
                            }
                            RetryDecision::Abort => {
                                return Err(self.failure(
                                    tier_error.category,
                                    tier_error.message,
                                    pattern_id,
                                    &attempted,
                                    trace,
                                ));
                            }
                        }
                    }
                }
            }
        }

        let (category, message, pattern_id) = last_failure.unwrap_or((
            FailureCategory::Unknown,
            "no tier was able to satisfy the request".to_string(),
            None,
        ));
        Err(self.failure(category, message, pattern_id, &attempted, trace))
    }

    // ------------------------------------------------------------------
    // Tier execution
    // ------------------------------------------------------------------

    async fn run_tier(
        &self,
        tier: Tier,
        matched: Option<&PatternMatch>,
        url: &str,
        options: &FetchOptions,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<TierOutcome, TierError> {
        match tier {
            Tier::Intelligence => {
                let matched = matched.ok_or_else(|| {
                    TierError::new(
                        FailureCategory::Unknown,
                        "intelligence tier scheduled without a pattern",
                    )
                })?;
                let outcome = tokio::select! {
                    outcome = self.registry.apply(matched) => outcome,
                    _ = cancel.cancelled() => {
                        return Err(TierError::new(
                            FailureCategory::Timeout,
                            "pattern application cancelled",
                        ));
                    }
                };
                outcome
                    .map(|applied| pattern_outcome(url, applied))
                    .map_err(|e| TierError {
                        category: e.category,
                        message: e.message,
                        status_code: e.status_code,
                    })
            }
            Tier::Lightweight => self.lightweight.fetch(url, options, timeout, cancel).await,
            Tier::Playwright => match &self.rendered {
                Some(rendered) => {
                    let (mut outcome, extras) =
                        rendered.fetch(url, options, timeout, cancel).await?;
                    // Captured network traffic is the learner's richest
                    // source of API candidates
                    if outcome.discovered_apis.is_none() && !extras.network_requests.is_empty() {
                        let apis: Vec<String> = extras
                            .network_requests
                            .iter()
                            .filter(|r| r.contains("/api/") || r.ends_with(".json"))
                            .cloned()
                            .collect();
                        if !apis.is_empty() {
                            outcome.discovered_apis = Some(apis);
                        }
                    }
                    Ok(outcome)
                }
                None => Err(TierError::new(
                    FailureCategory::Unknown,
                    "no rendered tier is configured",
                )),
            },
        }
    }

    fn assemble(
        &self,
        url: &str,
        tier: Tier,
        attempted: &[Tier],
        outcome: TierOutcome,
        elapsed: Duration,
    ) -> FetchResult {
        let final_url = if outcome.final_url.is_empty() {
            url.to_string()
        } else {
            outcome.final_url
        };
        FetchResult {
            final_url,
            http_status: outcome.response.status,
            content: outcome.content,
            tables: outcome.tables,
            links: outcome.links,
            discovered_apis: outcome.discovered_apis,
            tier_used: tier,
            tiers_attempted: attempted.to_vec(),
            duration_ms: elapsed.as_millis() as u64,
            tier_cost_units: tier.cost_units(),
            verification_confidence: 0.0,
            structured_data: outcome.structured_data,
            decision_trace: None,
        }
    }

    fn success(
        &self,
        mut result: FetchResult,
        pattern_id: Option<PatternId>,
        report: VerificationReport,
        trace: Option<Vec<String>>,
    ) -> FetchSuccess {
        result.verification_confidence = report.confidence;
        result.decision_trace = trace;
        let passed_check_names = report
            .outcomes
            .iter()
            .filter(|o| o.passed)
            .map(|o| o.name.clone())
            .collect();
        FetchSuccess {
            result,
            pattern_id,
            report_passed: report.passed,
            passed_check_names,
        }
    }

    fn failure(
        &self,
        category: FailureCategory,
        message: String,
        pattern_id: Option<PatternId>,
        attempted: &[Tier],
        trace: Option<Vec<String>>,
    ) -> FetchFailure {
        debug!(category = %category, %message, "fetch exhausted");
        FetchFailure {
            category,
            message,
            pattern_id,
            tiers_attempted: attempted.to_vec(),
            decision_trace: trace,
        }
    }

    /// Caller-facing learned-check bookkeeping: record outcome of this
    /// fetch for the domain
    pub fn note_verification(&self, fingerprint: &str, domain: &str, success: &FetchSuccess) {
        if success.report_passed {
            self.learned_checks.note_success(
                fingerprint,
                domain,
                &success.passed_check_names,
            );
        } else {
            self.learned_checks.note_failure(fingerprint);
        }
    }
}

/// Convert a pattern application into the common tier outcome shape
fn pattern_outcome(url: &str, applied: crate::patterns::ApplicationOutcome) -> TierOutcome {
    let content = render_mapped(&applied.content);
    TierOutcome {
        response: super::TierResponse {
            status: applied.status,
            headers: Default::default(),
            body: applied.raw_body,
        },
        final_url: url.to_string(),
        content,
        tables: None,
        links: None,
        discovered_apis: Some(vec![applied.endpoint]),
        structured_data: applied.structured,
    }
}

/// Render mapped API content as canonical markdown and text
fn render_mapped(mapped: &MappedContent) -> FetchContent {
    let mut markdown = format!("# {}\n", mapped.title);
    let mut text = mapped.title.clone();

    if let Some(description) = &mapped.description {
        markdown.push_str(&format!("\n{}\n", description));
        text.push_str(&format!(" {}", description));
    }
    if let Some(body) = &mapped.body {
        markdown.push_str(&format!("\n{}\n", body));
        text.push_str(&format!(" {}", body));
    }
    if !mapped.metadata.is_empty() {
        markdown.push('\n');
        for (key, value) in &mapped.metadata {
            markdown.push_str(&format!("- **{}**: {}\n", key, value));
        }
    }

    FetchContent {
        markdown: markdown.trim_end().to_string(),
        text,
        html: None,
    }
}

/// Stable fingerprint of one request: tenant, normalized URL, options hash
pub fn request_fingerprint(tenant: &str, url: &str, options: &FetchOptions) -> String {
    use sha2::{Digest, Sha256};
    let normalized = url::Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());
    let options_json = serde_json::to_string(options).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized.as_bytes());
    hasher.update(b"\0");
    hasher.update(options_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
