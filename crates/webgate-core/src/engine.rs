//! # Engine
//!
//! Owns every component, wires the learning loop, and exposes the
//! operation surface the hosting layer maps onto its HTTP routes.
//!
//! The learning coordinator lives here: each fetch outcome is fed back
//! into the pattern registry, anti-pattern store, and health monitor, and
//! fanned out to webhook endpoints. All bookkeeping is best-effort; a
//! failed counter increment or webhook dispatch never fails the fetch.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::GatewayConfig;
use crate::fetch::{
    request_fingerprint, FetchFailure, FetchOptions, FetchResult, FetchSuccess, FetcherConfig,
    HttpLightweightTier, LightweightTier, RenderedTier, TieredFetcher,
};
use crate::patterns::{
    AntiPatternStore, FailureRecord, HealthMonitor, PatternRegistry, RegistryConfig,
    RegistryStats, SuccessObservation,
};
use crate::retry::RetryEngine;
use crate::safety::{validate_url, SafetyConfig};
use crate::scheduler::{normalize_domain, DomainRateLimit, DomainScheduler};
use crate::tracker::{ChangeReport, ChangeSignificance, ContentTracker, TrackedUrlFilter};
use crate::usage::{UsageBackend, UsageCounter, UsageSnapshot};
use crate::verify::{LearnedCheckStore, Verifier};
use crate::webhook::{
    DispatcherConfig, EndpointSpec, EventMetadata, EventType, GatewayEvent, WebhookDelivery,
    WebhookDispatcher, WebhookEndpoint, WebhookError, WebhookStats,
};
use crate::{
    AntiPattern, ApiPattern, CancelToken, FailureCategory, GatewayError, GatewayResult,
    HealthStatus, Severity, Tenant, Tier, Timestamp,
};

// ============================================================================
// Construction
// ============================================================================

/// Injectable collaborators; defaults cover everything but the rendered
/// tier, which has no in-core implementation
pub struct EngineDeps {
    pub safety: SafetyConfig,
    pub scheduler_default: DomainRateLimit,
    pub registry_config: RegistryConfig,
    pub fetcher_config: FetcherConfig,
    pub dispatcher_config: DispatcherConfig,
    pub lightweight_tier: Option<Arc<dyn LightweightTier>>,
    pub rendered_tier: Option<Arc<dyn RenderedTier>>,
    pub usage_backend: Option<Arc<dyn UsageBackend>>,
}

impl Default for EngineDeps {
    fn default() -> Self {
        Self {
            safety: SafetyConfig::default(),
            scheduler_default: DomainRateLimit::default(),
            registry_config: RegistryConfig::default(),
            fetcher_config: FetcherConfig::default(),
            dispatcher_config: DispatcherConfig::default(),
            lightweight_tier: None,
            rendered_tier: None,
            usage_backend: None,
        }
    }
}

/// Interval between background decay/expiry passes
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// The assembled gateway core
pub struct Engine {
    config: GatewayConfig,
    safety: SafetyConfig,
    registry: Arc<PatternRegistry>,
    anti_patterns: Arc<AntiPatternStore>,
    health: Arc<HealthMonitor>,
    fetcher: TieredFetcher,
    learned_checks: Arc<LearnedCheckStore>,
    usage: UsageCounter,
    dispatcher: Arc<WebhookDispatcher>,
    tracker: Arc<ContentTracker>,
    maintenance_stop: tokio::sync::watch::Sender<bool>,
    maintenance_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Engine {
    /// Assemble an engine with default collaborators
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        Self::with_deps(config, EngineDeps::default()).await
    }

    /// Assemble an engine with injected collaborators
    pub async fn with_deps(config: GatewayConfig, deps: EngineDeps) -> GatewayResult<Self> {
        config.validate()?;

        let anti_patterns = Arc::new(AntiPatternStore::default());
        let registry = Arc::new(PatternRegistry::new(
            deps.registry_config,
            anti_patterns.clone(),
        ));

        let patterns_path = config.patterns_path();
        match crate::patterns::load_registry_file(&patterns_path).await {
            Ok(Some(snapshot)) => {
                info!(patterns = snapshot.patterns.len(), "pattern registry loaded");
                registry.restore(snapshot);
            }
            Ok(None) => registry.bootstrap(),
            Err(e) => {
                return Err(GatewayError::internal(format!(
                    "pattern state is unreadable: {}",
                    e
                )))
            }
        }
        registry.enable_persistence(patterns_path);

        let tracker = Arc::new(
            ContentTracker::open(config.content_changes_path())
                .await
                .map_err(|e| {
                    GatewayError::internal(format!("tracker state is unreadable: {}", e))
                })?,
        );

        let scheduler = Arc::new(DomainScheduler::new(deps.scheduler_default));
        let learned_checks = Arc::new(LearnedCheckStore::default());
        let lightweight = deps
            .lightweight_tier
            .unwrap_or_else(|| Arc::new(HttpLightweightTier::new()));

        let fetcher = TieredFetcher::new(
            deps.fetcher_config,
            registry.clone(),
            scheduler,
            RetryEngine::new(),
            lightweight,
            deps.rendered_tier,
            Verifier::new(),
            learned_checks.clone(),
        );

        let usage = match deps.usage_backend {
            Some(backend) => UsageCounter::with_backend(backend),
            None => UsageCounter::in_memory(),
        };

        let mut dispatcher_config = deps.dispatcher_config;
        dispatcher_config.max_endpoints_per_tenant = config.max_webhook_endpoints_per_tenant;
        let dispatcher = Arc::new(WebhookDispatcher::new(dispatcher_config));

        // Periodic decay/expiry tick; stopped by shutdown
        let (maintenance_stop, mut stop_rx) = tokio::sync::watch::channel(false);
        let tick_registry = registry.clone();
        let tick_anti_patterns = anti_patterns.clone();
        let maintenance_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tick_registry.decay();
                        tick_anti_patterns.purge_expired();
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        Ok(Self {
            config,
            safety: deps.safety,
            registry,
            anti_patterns,
            health: Arc::new(HealthMonitor::default()),
            fetcher,
            learned_checks,
            usage,
            dispatcher,
            tracker,
            maintenance_stop,
            maintenance_task: std::sync::Mutex::new(Some(maintenance_task)),
        })
    }

    /// The pattern registry (tool surface)
    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    /// The content tracker (tool surface)
    pub fn tracker(&self) -> &Arc<ContentTracker> {
        &self.tracker
    }

    // ------------------------------------------------------------------
    // Browse / fetch / batch
    // ------------------------------------------------------------------

    /// Full browse: all tiers up to the request cap
    #[instrument(skip(self, tenant, options), fields(tenant = %tenant.id))]
    pub async fn browse(
        &self,
        tenant: &Tenant,
        url: &str,
        options: FetchOptions,
    ) -> GatewayResult<FetchResult> {
        let verdict = validate_url(url, &self.safety);
        if !verdict.safe {
            let category = verdict
                .category
                .map(|c| c.as_str())
                .unwrap_or("unknown");
            warn!(category, "rejected unsafe URL");
            return Err(GatewayError::InvalidRequest {
                message: verdict
                    .reason
                    .unwrap_or_else(|| "URL is not safe to fetch".to_string()),
                details: Some(serde_json::json!({ "category": category })),
            });
        }

        // Budget gate before any scheduling or network work
        let planned_cost = self.fetcher.planned_cost(url, &options);
        let daily_limit = if tenant.daily_limit > 0 {
            tenant.daily_limit
        } else {
            self.config.default_daily_limit
        };
        let used = self.usage.units_today(&tenant.id).await;
        if used + planned_cost > daily_limit {
            return Err(GatewayError::LimitExceeded {
                message: format!(
                    "daily unit budget exhausted ({} of {} used)",
                    used, daily_limit
                ),
                details: Some(serde_json::json!({
                    "used": used,
                    "daily_limit": daily_limit,
                    "planned_cost": planned_cost,
                })),
            });
        }

        let (cancel_handle, cancel) = CancelToken::new();
        let fetched = match options.max_latency_ms {
            Some(budget_ms) => {
                let fut = self.fetcher.execute(url, &options, &cancel);
                match tokio::time::timeout(Duration::from_millis(budget_ms), fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        cancel_handle.cancel();
                        return Err(GatewayError::cancelled(format!(
                            "request exceeded its {}ms latency budget",
                            budget_ms
                        )));
                    }
                }
            }
            None => self.fetcher.execute(url, &options, &cancel).await,
        };

        let fingerprint = request_fingerprint(tenant.id.as_str(), url, &options);
        let domain = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_domain))
            .unwrap_or_default();

        match fetched {
            Ok(success) => {
                self.on_fetch_success(tenant, url, &domain, &fingerprint, &success)
                    .await;
                Ok(success.result)
            }
            Err(failure) => {
                self.on_fetch_failure(tenant, url, &domain, &fingerprint, &failure);
                let err = GatewayError::FetchFailed {
                    category: failure.category,
                    message: failure.message.clone(),
                    details: Some(serde_json::json!({
                        "tiers_attempted": failure.tiers_attempted,
                    })),
                };
                warn!(code = err.code(), url, "fetch surfaced to caller");
                Err(err)
            }
        }
    }

    /// Like [`Self::browse`] but capped below the rendered tier
    pub async fn fetch(
        &self,
        tenant: &Tenant,
        url: &str,
        mut options: FetchOptions,
    ) -> GatewayResult<FetchResult> {
        let cap = options
            .max_cost_tier
            .map(|t| t.min(Tier::Lightweight))
            .unwrap_or(Tier::Lightweight);
        options.max_cost_tier = Some(cap);
        self.browse(tenant, url, options).await
    }

    /// Run `browse` across URLs with a concurrency cap
    pub async fn batch(
        self: &Arc<Self>,
        tenant: &Tenant,
        urls: Vec<String>,
        options: FetchOptions,
        batch_options: BatchOptions,
    ) -> GatewayResult<Vec<BatchOutcome>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        if urls.len() > batch_options.max_urls {
            return Err(GatewayError::limit_exceeded(format!(
                "batch of {} exceeds the {}-URL cap",
                urls.len(),
                batch_options.max_urls
            )));
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            batch_options.concurrency.max(1),
        ));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut joins = Vec::with_capacity(urls.len());

        let deadline = batch_options
            .total_timeout_ms
            .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));

        for url in urls {
            let engine = Arc::clone(self);
            let tenant = tenant.clone();
            let options = options.clone();
            let semaphore = semaphore.clone();
            let stop = stop.clone();
            let batch_options = batch_options.clone();

            joins.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return BatchOutcome::skipped(url, 0),
                };
                if stop.load(std::sync::atomic::Ordering::SeqCst) {
                    return BatchOutcome::skipped(url, 0);
                }
                if let Some(deadline) = deadline {
                    if tokio::time::Instant::now() >= deadline {
                        return BatchOutcome::skipped(url, 0);
                    }
                }

                let started = std::time::Instant::now();
                let fut = engine.browse(&tenant, &url, options);
                let outcome = match batch_options.per_url_timeout_ms {
                    Some(ms) => {
                        match tokio::time::timeout(Duration::from_millis(ms), fut).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(GatewayError::cancelled("per-URL timeout")),
                        }
                    }
                    None => fut.await,
                };
                let duration_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(result) => BatchOutcome {
                        url,
                        status: BatchItemStatus::Success,
                        result: Some(Box::new(result)),
                        error: None,
                        duration_ms,
                    },
                    Err(err) => {
                        let status = if err.code() == "limit_exceeded"
                            || matches!(
                                &err,
                                GatewayError::FetchFailed {
                                    category: FailureCategory::RateLimited,
                                    ..
                                }
                            ) {
                            if !batch_options.continue_on_rate_limit {
                                stop.store(true, std::sync::atomic::Ordering::SeqCst);
                            }
                            BatchItemStatus::RateLimited
                        } else {
                            if batch_options.stop_on_error {
                                stop.store(true, std::sync::atomic::Ordering::SeqCst);
                            }
                            BatchItemStatus::Error
                        };
                        BatchOutcome {
                            url,
                            status,
                            result: None,
                            error: Some(format!("{}: {}", err.code(), err)),
                            duration_ms,
                        }
                    }
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(joins.len());
        for join in joins {
            match join.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    outcomes.push(BatchOutcome {
                        url: String::new(),
                        status: BatchItemStatus::Error,
                        result: None,
                        error: Some(format!("internal: task failed: {}", e)),
                        duration_ms: 0,
                    });
                }
            }
        }
        Ok(outcomes)
    }

    // ------------------------------------------------------------------
    // Learning coordinator
    // ------------------------------------------------------------------

    async fn on_fetch_success(
        &self,
        tenant: &Tenant,
        url: &str,
        domain: &str,
        fingerprint: &str,
        success: &FetchSuccess,
    ) {
        self.fetcher.note_verification(fingerprint, domain, success);

        if let Some(pattern_id) = success.pattern_id {
            self.registry
                .observe_success(pattern_id, success.result.duration_ms, domain);
            if let Some(transition) = self.health.record(pattern_id, true, None) {
                self.dispatch_health_transition(tenant, domain, &transition);
            }
        } else if let Some(apis) = &success.result.discovered_apis {
            // A pattern-less success that exposed an API endpoint is a
            // learning opportunity
            if let Some(api_url) = apis.first() {
                let learned = self.registry.learn(&SuccessObservation {
                    page_url: url.to_string(),
                    api_url: api_url.clone(),
                    content_type: None,
                    domain: domain.to_string(),
                });
                if let Some(pattern) = learned {
                    self.emit(
                        tenant,
                        EventType::PatternLearned,
                        serde_json::json!({
                            "pattern_id": pattern.id.as_str(),
                            "template_type": pattern.template_type,
                            "domain": domain,
                        }),
                        Some(domain),
                        Severity::Low,
                    );
                }
            }
        }

        self.usage
            .record(&tenant.id, success.result.tier_used, success.result.tier_cost_units)
            .await;

        self.emit(
            tenant,
            EventType::FetchSucceeded,
            serde_json::json!({
                "url": url,
                "final_url": success.result.final_url,
                "tier_used": success.result.tier_used,
                "duration_ms": success.result.duration_ms,
                "verification_confidence": success.result.verification_confidence,
            }),
            Some(domain),
            Severity::Low,
        );

        // Change tracking rides along when the URL is watched; the check
        // runs off-path so persistence never delays the response
        if self.tracker.is_tracked(url) {
            let tracker = self.tracker.clone();
            let dispatcher = self.dispatcher.clone();
            let tenant = tenant.clone();
            let url = url.to_string();
            let domain = domain.to_string();
            let text = success.result.content.text.clone();
            tokio::spawn(async move {
                match tracker.check(&url, &text).await {
                    Ok(report) if report.changed => {
                        let severity = match report.significance {
                            Some(ChangeSignificance::High) => Severity::High,
                            Some(ChangeSignificance::Medium) => Severity::Medium,
                            _ => Severity::Low,
                        };
                        let event = GatewayEvent::new(
                            EventType::ChangeDetected,
                            tenant.id.clone(),
                            serde_json::json!({
                                "url": url,
                                "word_count_delta": report.word_count_delta,
                                "added_sections": report.added_sections,
                                "removed_sections": report.removed_sections,
                            }),
                            EventMetadata {
                                domain: Some(domain),
                                severity: Some(severity),
                            },
                        );
                        dispatcher.dispatch(&event);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "tracked-URL check failed"),
                }
            });
        }
    }

    fn on_fetch_failure(
        &self,
        tenant: &Tenant,
        url: &str,
        domain: &str,
        fingerprint: &str,
        failure: &FetchFailure,
    ) {
        self.learned_checks.note_failure(fingerprint);

        if let Some(pattern_id) = failure.pattern_id {
            self.registry.observe_failure(FailureRecord {
                timestamp: Timestamp::now(),
                category: failure.category,
                status_code: None,
                message: failure.message.clone(),
                domain: domain.to_string(),
                attempted_url: url.to_string(),
                pattern_id,
                response_time_ms: None,
            });

            if let Some(anti) = self.anti_patterns.record_failure(
                pattern_id,
                domain,
                failure.category,
                &failure.message,
            ) {
                self.registry.note_anti_pattern(pattern_id, anti.id);
                self.emit(
                    tenant,
                    EventType::AntiPatternCreated,
                    serde_json::json!({
                        "anti_pattern_id": anti.id.as_str(),
                        "pattern_id": pattern_id.as_str(),
                        "category": anti.failure_category,
                        "recommended_action": anti.recommended_action,
                    }),
                    Some(domain),
                    Severity::Medium,
                );
            }

            if let Some(transition) =
                self.health.record(pattern_id, false, Some(failure.category))
            {
                self.dispatch_health_transition(tenant, domain, &transition);
            }
        }

        self.emit(
            tenant,
            EventType::FetchFailed,
            serde_json::json!({
                "url": url,
                "category": failure.category,
                "message": failure.message,
                "tiers_attempted": failure.tiers_attempted,
            }),
            Some(domain),
            Severity::Medium,
        );
    }

    fn dispatch_health_transition(
        &self,
        tenant: &Tenant,
        domain: &str,
        transition: &crate::patterns::HealthTransition,
    ) {
        let (event_type, severity) = match transition.new_status {
            HealthStatus::Broken => (EventType::PatternBroken, Severity::High),
            HealthStatus::Degraded | HealthStatus::Failing => {
                (EventType::PatternDegraded, Severity::Medium)
            }
            HealthStatus::Healthy => return,
        };
        self.emit(
            tenant,
            event_type,
            serde_json::json!({
                "pattern_id": transition.pattern_id.as_str(),
                "previous_status": transition.previous_status,
                "new_status": transition.new_status,
                "suggested_actions": transition.suggested_actions,
            }),
            Some(domain),
            severity,
        );
    }

    /// Build and dispatch one event; never fails the caller
    fn emit(
        &self,
        tenant: &Tenant,
        event_type: EventType,
        data: serde_json::Value,
        domain: Option<&str>,
        severity: Severity,
    ) {
        let event = GatewayEvent::new(
            event_type,
            tenant.id.clone(),
            data,
            EventMetadata {
                domain: domain.map(str::to_string),
                severity: Some(severity),
            },
        );
        self.dispatcher.dispatch(&event);
    }

    // ------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------

    /// Usage report for the tenant
    pub async fn usage(&self, tenant: &Tenant) -> UsageReport {
        let today = self.usage.today(&tenant.id).await;
        let month_start = format!("{}-01", &today.day[..7]);
        let month = self.usage.range(&tenant.id, &month_start, &today.day).await;

        let month_requests = month.iter().map(|d| d.requests).sum();
        let month_units = month.iter().map(|d| d.units).sum();

        UsageReport {
            today,
            month_requests,
            month_units,
            daily_limit: if tenant.daily_limit > 0 {
                tenant.daily_limit
            } else {
                self.config.default_daily_limit
            },
            monthly_limit: tenant.monthly_limit,
        }
    }

    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    /// Register a webhook endpoint
    pub fn create_webhook(
        &self,
        tenant: &Tenant,
        spec: EndpointSpec,
    ) -> Result<WebhookEndpoint, WebhookError> {
        self.dispatcher.create_endpoint(&tenant.id, spec)
    }

    /// Update a webhook endpoint
    pub fn update_webhook(
        &self,
        id: crate::EndpointId,
        spec: EndpointSpec,
    ) -> Result<WebhookEndpoint, WebhookError> {
        self.dispatcher.update_endpoint(id, spec)
    }

    /// Delete a webhook endpoint, cancelling its pending retries
    pub fn delete_webhook(&self, id: crate::EndpointId) -> Result<(), WebhookError> {
        self.dispatcher.delete_endpoint(id)
    }

    /// List a tenant's webhook endpoints
    pub fn list_webhooks(&self, tenant: &Tenant) -> Vec<WebhookEndpoint> {
        self.dispatcher.list_endpoints(&tenant.id)
    }

    /// Fire a signed test delivery at an endpoint
    pub async fn test_webhook(
        &self,
        id: crate::EndpointId,
    ) -> Result<WebhookDelivery, WebhookError> {
        self.dispatcher.test_endpoint(id).await
    }

    /// Recent deliveries of an endpoint
    pub fn webhook_history(&self, id: crate::EndpointId, limit: usize) -> Vec<WebhookDelivery> {
        self.dispatcher.history(id, limit)
    }

    /// Delivery statistics for a tenant
    pub fn webhook_stats(&self, tenant: &Tenant, period_hours: u64) -> WebhookStats {
        self.dispatcher.stats(&tenant.id, period_hours)
    }

    // ------------------------------------------------------------------
    // Tracking and registry surfaces
    // ------------------------------------------------------------------

    /// Track a URL for change detection using its current content
    pub async fn track_url(
        &self,
        url: &str,
        text: &str,
        label: Option<String>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        self.tracker
            .track(url, text, label, tags)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::invalid_request(e.to_string()))
    }

    /// Check a tracked URL against fresh content
    pub async fn check_tracked(&self, url: &str, text: &str) -> GatewayResult<ChangeReport> {
        self.tracker
            .check(url, text)
            .await
            .map_err(|e| GatewayError::invalid_request(e.to_string()))
    }

    /// List tracked URLs
    pub fn list_tracked(&self, filter: &TrackedUrlFilter) -> Vec<crate::TrackedUrl> {
        self.tracker.list(filter)
    }

    /// Registry statistics (tool surface)
    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Everything the gateway knows about a domain
    pub fn domain_summary(&self, domain: &str) -> DomainSummary {
        let key = normalize_domain(domain);
        let now = Timestamp::now();
        DomainSummary {
            patterns: self.registry.patterns_for_domain(&key),
            anti_patterns: self
                .anti_patterns
                .list()
                .into_iter()
                .filter(|anti| anti.is_active(now) && anti.domains.contains(&key))
                .collect(),
            learned_checks: self.learned_checks.check_names_for(&key),
        }
    }

    /// Periodic maintenance: pattern decay, anti-pattern expiry
    pub fn run_maintenance(&self) {
        self.registry.decay();
        self.anti_patterns.purge_expired();
    }

    /// Graceful shutdown: stop maintenance, flush persistence, drain
    /// webhook retries
    pub async fn shutdown(&self) {
        let _ = self.maintenance_stop.send(true);
        let task = {
            let mut slot = self
                .maintenance_task
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            slot.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }

        self.registry.flush().await;
        self.dispatcher.shutdown().await;
        info!("engine shut down");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state_dir", &self.config.state_dir)
            .finish()
    }
}

// ============================================================================
// Operation Result Types
// ============================================================================

/// Usage report returned by the `usage` operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageReport {
    pub today: UsageSnapshot,
    pub month_requests: u64,
    pub month_units: u64,
    pub daily_limit: u64,
    pub monthly_limit: u64,
}

/// Batch execution options
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub stop_on_error: bool,
    pub continue_on_rate_limit: bool,
    pub per_url_timeout_ms: Option<u64>,
    pub total_timeout_ms: Option<u64>,
    pub max_urls: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            stop_on_error: false,
            continue_on_rate_limit: true,
            per_url_timeout_ms: None,
            total_timeout_ms: None,
            max_urls: 50,
        }
    }
}

/// Per-URL batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Success,
    Error,
    Skipped,
    RateLimited,
}

/// Per-URL batch outcome
#[derive(Debug, serde::Serialize)]
pub struct BatchOutcome {
    pub url: String,
    pub status: BatchItemStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<FetchResult>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl BatchOutcome {
    fn skipped(url: String, duration_ms: u64) -> Self {
        Self {
            url,
            status: BatchItemStatus::Skipped,
            result: None,
            error: None,
            duration_ms,
        }
    }
}

/// Domain knowledge summary (tool surface)
#[derive(Debug, Clone)]
pub struct DomainSummary {
    pub patterns: Vec<ApiPattern>,
    pub anti_patterns: Vec<AntiPattern>,
    pub learned_checks: Vec<String>,
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
