//! # Webhook Dispatcher
//!
//! Matches events to endpoints, signs and delivers payloads, retries with
//! jittered exponential backoff, and circuit-breaks unhealthy endpoints.
//!
//! Deliveries to different endpoints of one event run concurrently as
//! independent tasks; attempts within one delivery are strictly ordered.
//! Retry timers live inside the delivery task and observe the dispatcher's
//! shutdown signal, so `shutdown` lets in-flight POSTs finish while
//! cancelling every pending retry.

use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    idempotency_key, sign_payload, DeliveryStatus, EndpointHealth, EndpointHealthStatus,
    EventCategory, EventType, GatewayEvent, WebhookDelivery, WebhookEndpoint,
};
use crate::scheduler::normalize_domain;
use crate::{DeliveryId, EndpointId, Severity, TenantId, Timestamp, ValidationError};

// ============================================================================
// Configuration
// ============================================================================

/// Dispatcher tuning knobs
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Consecutive failures before an endpoint is degraded
    pub degraded_threshold: u32,

    /// Consecutive failures before the circuit opens
    pub unhealthy_threshold: u32,

    /// How long an open circuit stays closed to dispatch
    pub circuit_breaker_reset: Duration,

    /// Per-attempt POST timeout
    pub delivery_timeout: Duration,

    /// Delivery records retained per endpoint
    pub history_cap: usize,

    /// Endpoints one tenant may register
    pub max_endpoints_per_tenant: usize,

    /// Jitter fraction applied to retry delays
    pub retry_jitter: f64,

    /// EMA weight for the endpoint response-time average
    pub response_time_ema: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: 2,
            unhealthy_threshold: 5,
            circuit_breaker_reset: Duration::from_secs(300),
            delivery_timeout: Duration::from_secs(30),
            history_cap: 100,
            max_endpoints_per_tenant: 10,
            retry_jitter: 0.3,
            response_time_ema: 0.2,
        }
    }
}

/// Parameters for creating or updating an endpoint
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub url: String,
    pub secret: String,
    pub enabled_events: std::collections::BTreeSet<EventType>,
    pub enabled_categories: Option<std::collections::BTreeSet<EventCategory>>,
    pub domain_filter: Option<String>,
    pub min_severity: Severity,
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub extra_headers: Option<HashMap<String, String>>,
}

impl EndpointSpec {
    /// Spec with conventional retry parameters
    pub fn new(
        url: impl Into<String>,
        secret: impl Into<String>,
        enabled_events: impl IntoIterator<Item = EventType>,
    ) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            enabled_events: enabled_events.into_iter().collect(),
            enabled_categories: None,
            domain_filter: None,
            min_severity: Severity::Low,
            enabled: true,
            max_retries: 3,
            initial_retry_delay_ms: 1_000,
            max_retry_delay_ms: 60_000,
            extra_headers: None,
        }
    }
}

// ============================================================================
// Errors and Stats
// ============================================================================

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("endpoint does not validate: {0}")]
    Invalid(#[from] ValidationError),

    #[error("tenant '{tenant}' is at its endpoint limit of {limit}")]
    EndpointLimit { tenant: TenantId, limit: usize },

    #[error("endpoint {0} not found")]
    NotFound(EndpointId),
}

/// Aggregated delivery statistics over a period
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WebhookStats {
    pub total_deliveries: u64,
    pub successes: u64,
    pub failures: u64,
    pub pending: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: Option<f64>,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Thread-safe webhook dispatcher
pub struct WebhookDispatcher {
    config: DispatcherConfig,
    client: reqwest::Client,
    endpoints: RwLock<HashMap<EndpointId, WebhookEndpoint>>,
    deliveries: Mutex<HashMap<EndpointId, VecDeque<WebhookDelivery>>>,
    tasks: Mutex<HashMap<DeliveryId, (EndpointId, JoinHandle<()>)>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field(
                "endpoints",
                &self.endpoints.read().map(|e| e.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl WebhookDispatcher {
    /// Create a dispatcher
    pub fn new(config: DispatcherConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            client: reqwest::Client::new(),
            endpoints: RwLock::new(HashMap::new()),
            deliveries: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    // ------------------------------------------------------------------
    // Endpoint CRUD
    // ------------------------------------------------------------------

    /// Register a new endpoint for a tenant
    pub fn create_endpoint(
        &self,
        tenant_id: &TenantId,
        spec: EndpointSpec,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let now = Timestamp::now();
        let endpoint = WebhookEndpoint {
            id: EndpointId::new(),
            tenant_id: tenant_id.clone(),
            url: spec.url,
            secret: spec.secret,
            enabled_events: spec.enabled_events,
            enabled_categories: spec.enabled_categories,
            domain_filter: spec.domain_filter,
            min_severity: spec.min_severity,
            enabled: spec.enabled,
            max_retries: spec.max_retries,
            initial_retry_delay_ms: spec.initial_retry_delay_ms,
            max_retry_delay_ms: spec.max_retry_delay_ms,
            extra_headers: spec.extra_headers,
            health: EndpointHealth::default(),
            created_at: now,
            updated_at: now,
        };
        endpoint.validate()?;

        let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
        let owned = endpoints
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .count();
        if owned >= self.config.max_endpoints_per_tenant {
            return Err(WebhookError::EndpointLimit {
                tenant: tenant_id.clone(),
                limit: self.config.max_endpoints_per_tenant,
            });
        }

        info!(endpoint_id = %endpoint.id, tenant = %tenant_id, "webhook endpoint created");
        endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    /// Replace the mutable fields of an endpoint
    pub fn update_endpoint(
        &self,
        id: EndpointId,
        spec: EndpointSpec,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
        let endpoint = endpoints.get_mut(&id).ok_or(WebhookError::NotFound(id))?;

        let mut updated = endpoint.clone();
        updated.url = spec.url;
        updated.secret = spec.secret;
        updated.enabled_events = spec.enabled_events;
        updated.enabled_categories = spec.enabled_categories;
        updated.domain_filter = spec.domain_filter;
        updated.min_severity = spec.min_severity;
        updated.enabled = spec.enabled;
        updated.max_retries = spec.max_retries;
        updated.initial_retry_delay_ms = spec.initial_retry_delay_ms;
        updated.max_retry_delay_ms = spec.max_retry_delay_ms;
        updated.extra_headers = spec.extra_headers;
        updated.updated_at = Timestamp::now();
        updated.validate()?;

        *endpoint = updated.clone();
        Ok(updated)
    }

    /// Delete an endpoint, cancelling all of its pending retries
    pub fn delete_endpoint(&self, id: EndpointId) -> Result<(), WebhookError> {
        {
            let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
            endpoints.remove(&id).ok_or(WebhookError::NotFound(id))?;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.retain(|_, (endpoint_id, handle)| {
            if *endpoint_id == id {
                handle.abort();
                false
            } else {
                true
            }
        });

        info!(endpoint_id = %id, "webhook endpoint deleted; pending retries cancelled");
        Ok(())
    }

    /// Endpoints owned by a tenant
    pub fn list_endpoints(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|p| p.into_inner());
        let mut owned: Vec<_> = endpoints
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .cloned()
            .collect();
        owned.sort_by_key(|e| e.created_at);
        owned
    }

    /// One endpoint by id
    pub fn get_endpoint(&self, id: EndpointId) -> Option<WebhookEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|p| p.into_inner());
        endpoints.get(&id).cloned()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Match an event against the tenant's endpoints and schedule one
    /// delivery per match. Returns the scheduled delivery ids.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub fn dispatch(self: &Arc<Self>, event: &GatewayEvent) -> Vec<DeliveryId> {
        let now = Timestamp::now();
        let matched: Vec<WebhookEndpoint> = {
            let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
            let mut matched = Vec::new();
            for endpoint in endpoints.values_mut() {
                if Self::circuit_admits(endpoint, now, &self.config)
                    && endpoint_matches(endpoint, event)
                {
                    matched.push(endpoint.clone());
                }
            }
            matched
        };

        let mut scheduled = Vec::with_capacity(matched.len());
        for endpoint in matched {
            scheduled.push(self.schedule_delivery(endpoint, event.clone()));
        }
        scheduled
    }

    /// Circuit-breaker gate. A reset-period elapsed demotes unhealthy to
    /// degraded, readmitting the endpoint.
    fn circuit_admits(
        endpoint: &mut WebhookEndpoint,
        now: Timestamp,
        config: &DispatcherConfig,
    ) -> bool {
        if endpoint.health.status != EndpointHealthStatus::Unhealthy {
            return true;
        }
        let since = match endpoint.health.unhealthy_since {
            Some(since) => since,
            None => return false,
        };
        if now.duration_since(since) >= config.circuit_breaker_reset {
            endpoint.health.status = EndpointHealthStatus::Degraded;
            endpoint.health.unhealthy_since = None;
            endpoint.health.consecutive_failures = 0;
            debug!(endpoint_id = %endpoint.id, "circuit breaker reset; endpoint demoted to degraded");
            true
        } else {
            false
        }
    }

    fn schedule_delivery(
        self: &Arc<Self>,
        endpoint: WebhookEndpoint,
        event: GatewayEvent,
    ) -> DeliveryId {
        let delivery = WebhookDelivery {
            id: DeliveryId::new(),
            endpoint_id: endpoint.id,
            event_id: event.id,
            event_type: event.event_type,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: endpoint.max_retries + 1,
            idempotency_key: idempotency_key(&event.id, &endpoint.id),
            response_status: None,
            response_time_ms: None,
            error_message: None,
            next_retry_at: None,
            created_at: Timestamp::now(),
            completed_at: None,
        };
        let delivery_id = delivery.id;
        self.push_delivery(delivery);

        let dispatcher = Arc::clone(self);
        let endpoint_id = endpoint.id;
        let handle = tokio::spawn(async move {
            dispatcher.run_delivery(endpoint_id, event, delivery_id).await;
            let mut tasks = dispatcher.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.remove(&delivery_id);
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.insert(delivery_id, (endpoint_id, handle));
        delivery_id
    }

    /// Drive one delivery to a terminal state (or until shutdown cancels
    /// its retries)
    async fn run_delivery(
        self: &Arc<Self>,
        endpoint_id: EndpointId,
        event: GatewayEvent,
        delivery_id: DeliveryId,
    ) {
        let body: bytes::Bytes = match serde_json::to_vec(&event) {
            Ok(body) => body.into(),
            Err(e) => {
                self.update_delivery(endpoint_id, delivery_id, |delivery| {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.error_message = Some(format!("event does not serialize: {}", e));
                    delivery.completed_at = Some(Timestamp::now());
                });
                return;
            }
        };

        loop {
            // Re-read the endpoint every attempt so secret rotations and
            // deletions take effect mid-chain
            let Some(endpoint) = self.get_endpoint(endpoint_id) else {
                return;
            };

            let attempt = self
                .update_delivery(endpoint_id, delivery_id, |delivery| {
                    delivery.attempts += 1;
                    delivery.attempts
                })
                .unwrap_or(1);

            let outcome = self.attempt(&endpoint, &event, &body).await;

            match outcome {
                Ok((status, elapsed_ms)) => {
                    self.update_delivery(endpoint_id, delivery_id, |delivery| {
                        delivery.status = DeliveryStatus::Success;
                        delivery.response_status = Some(status);
                        delivery.response_time_ms = Some(elapsed_ms);
                        delivery.next_retry_at = None;
                        delivery.completed_at = Some(Timestamp::now());
                    });
                    self.record_endpoint_success(endpoint_id, elapsed_ms);
                    return;
                }
                Err((status, message, elapsed_ms)) => {
                    self.record_endpoint_failure(endpoint_id);

                    let max_attempts = endpoint.max_retries + 1;
                    if attempt >= max_attempts {
                        self.update_delivery(endpoint_id, delivery_id, |delivery| {
                            delivery.status = DeliveryStatus::Failed;
                            delivery.response_status = status;
                            delivery.response_time_ms = Some(elapsed_ms);
                            delivery.error_message = Some(message);
                            delivery.next_retry_at = None;
                            delivery.completed_at = Some(Timestamp::now());
                        });
                        return;
                    }

                    let delay = retry_delay(
                        attempt,
                        endpoint.initial_retry_delay_ms,
                        endpoint.max_retry_delay_ms,
                        self.config.retry_jitter,
                    );
                    self.update_delivery(endpoint_id, delivery_id, |delivery| {
                        delivery.status = DeliveryStatus::Retrying;
                        delivery.response_status = status;
                        delivery.response_time_ms = Some(elapsed_ms);
                        delivery.error_message = Some(message);
                        delivery.next_retry_at = Some(Timestamp::now().add_duration(delay));
                    });

                    let mut shutdown = self.shutdown_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            debug!(delivery_id = %delivery_id, "retry cancelled by shutdown");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// One signed POST. Returns `(status, elapsed_ms)` on 2xx.
    async fn attempt(
        &self,
        endpoint: &WebhookEndpoint,
        event: &GatewayEvent,
        body: &bytes::Bytes,
    ) -> Result<(u16, u64), (Option<u16>, String, u64)> {
        let signature = sign_payload(&endpoint.secret, body);
        let started = std::time::Instant::now();

        let mut request = self
            .client
            .post(&endpoint.url)
            .timeout(self.config.delivery_timeout)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Id", endpoint.id.as_str())
            .header("X-Webhook-Event", event.event_type.as_str())
            .header("X-Webhook-Timestamp", event.timestamp.unix_ms().to_string())
            .header("X-Webhook-Signature", signature)
            .header(
                "X-Idempotency-Key",
                idempotency_key(&event.id, &endpoint.id),
            )
            .body(body.clone());

        if let Some(extras) = &endpoint.extra_headers {
            for (name, value) in extras {
                request = request.header(name, value);
            }
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if (200..300).contains(&status) {
                    Ok((status, elapsed_ms))
                } else {
                    Err((
                        Some(status),
                        format!("endpoint answered {}", status),
                        elapsed_ms,
                    ))
                }
            }
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                Err((None, e.to_string(), elapsed_ms))
            }
        }
    }

    // ------------------------------------------------------------------
    // Test deliveries, history, stats
    // ------------------------------------------------------------------

    /// Deliver a signed `system.health` event once, outside the retry
    /// machinery; used by the endpoint test operation
    pub async fn test_endpoint(&self, id: EndpointId) -> Result<WebhookDelivery, WebhookError> {
        let endpoint = self.get_endpoint(id).ok_or(WebhookError::NotFound(id))?;
        let event = GatewayEvent::new(
            EventType::SystemHealth,
            endpoint.tenant_id.clone(),
            serde_json::json!({"test": true}),
            Default::default(),
        );
        let body: bytes::Bytes = serde_json::to_vec(&event).unwrap_or_default().into();

        let mut delivery = WebhookDelivery {
            id: DeliveryId::new(),
            endpoint_id: id,
            event_id: event.id,
            event_type: EventType::SystemHealth,
            status: DeliveryStatus::Pending,
            attempts: 1,
            max_attempts: 1,
            idempotency_key: idempotency_key(&event.id, &id),
            response_status: None,
            response_time_ms: None,
            error_message: None,
            next_retry_at: None,
            created_at: Timestamp::now(),
            completed_at: None,
        };

        match self.attempt(&endpoint, &event, &body).await {
            Ok((status, elapsed_ms)) => {
                delivery.status = DeliveryStatus::Success;
                delivery.response_status = Some(status);
                delivery.response_time_ms = Some(elapsed_ms);
            }
            Err((status, message, elapsed_ms)) => {
                delivery.status = DeliveryStatus::Failed;
                delivery.response_status = status;
                delivery.response_time_ms = Some(elapsed_ms);
                delivery.error_message = Some(message);
            }
        }
        delivery.completed_at = Some(Timestamp::now());

        self.push_delivery(delivery.clone());
        Ok(delivery)
    }

    /// Recent deliveries of one endpoint, newest first
    pub fn history(&self, endpoint_id: EndpointId, limit: usize) -> Vec<WebhookDelivery> {
        let deliveries = self.deliveries.lock().unwrap_or_else(|p| p.into_inner());
        deliveries
            .get(&endpoint_id)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Delivery statistics across a tenant's endpoints over the last
    /// `period_hours`
    pub fn stats(&self, tenant_id: &TenantId, period_hours: u64) -> WebhookStats {
        let cutoff =
            Timestamp::now().subtract_duration(Duration::from_secs(period_hours * 3600));
        let owned: Vec<EndpointId> = self
            .list_endpoints(tenant_id)
            .into_iter()
            .map(|e| e.id)
            .collect();

        let deliveries = self.deliveries.lock().unwrap_or_else(|p| p.into_inner());
        let mut stats = WebhookStats {
            total_deliveries: 0,
            successes: 0,
            failures: 0,
            pending: 0,
            success_rate: 0.0,
            avg_response_time_ms: None,
        };
        let mut time_sum = 0.0;
        let mut time_count = 0u64;

        for endpoint_id in owned {
            let Some(ring) = deliveries.get(&endpoint_id) else {
                continue;
            };
            for delivery in ring.iter().filter(|d| d.created_at >= cutoff) {
                stats.total_deliveries += 1;
                match delivery.status {
                    DeliveryStatus::Success => stats.successes += 1,
                    DeliveryStatus::Failed => stats.failures += 1,
                    DeliveryStatus::Pending | DeliveryStatus::Retrying => stats.pending += 1,
                }
                if let Some(elapsed) = delivery.response_time_ms {
                    time_sum += elapsed as f64;
                    time_count += 1;
                }
            }
        }

        let settled = stats.successes + stats.failures;
        if settled > 0 {
            stats.success_rate = stats.successes as f64 / settled as f64;
        }
        if time_count > 0 {
            stats.avg_response_time_ms = Some(time_sum / time_count as f64);
        }
        stats
    }

    /// Cancel pending retries and wait briefly for in-flight deliveries
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.drain().map(|(_, (_, handle))| handle).collect()
        };
        for handle in handles {
            let _ = tokio::time::timeout(self.config.delivery_timeout, handle).await;
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn push_delivery(&self, delivery: WebhookDelivery) {
        let mut deliveries = self.deliveries.lock().unwrap_or_else(|p| p.into_inner());
        let ring = deliveries.entry(delivery.endpoint_id).or_default();
        ring.push_back(delivery);
        while ring.len() > self.config.history_cap {
            ring.pop_front();
        }
    }

    /// Mutate one delivery record. Terminal records are never touched; a
    /// late update against one is a bug worth a warning, not a panic.
    fn update_delivery<R>(
        &self,
        endpoint_id: EndpointId,
        delivery_id: DeliveryId,
        mutate: impl FnOnce(&mut WebhookDelivery) -> R,
    ) -> Option<R> {
        let mut deliveries = self.deliveries.lock().unwrap_or_else(|p| p.into_inner());
        let ring = deliveries.get_mut(&endpoint_id)?;
        let delivery = ring.iter_mut().find(|d| d.id == delivery_id)?;
        if delivery.status.is_terminal() {
            warn!(delivery_id = %delivery_id, "ignoring update to terminal delivery");
            return None;
        }
        Some(mutate(delivery))
    }

    fn record_endpoint_success(&self, id: EndpointId, elapsed_ms: u64) {
        let ema = self.config.response_time_ema;
        let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
        if let Some(endpoint) = endpoints.get_mut(&id) {
            let health = &mut endpoint.health;
            health.consecutive_failures = 0;
            health.status = EndpointHealthStatus::Healthy;
            health.unhealthy_since = None;
            health.total_deliveries += 1;
            health.last_delivery_at = Some(Timestamp::now());
            health.avg_response_time_ms = Some(match health.avg_response_time_ms {
                Some(avg) => ema * elapsed_ms as f64 + (1.0 - ema) * avg,
                None => elapsed_ms as f64,
            });
        }
    }

    fn record_endpoint_failure(&self, id: EndpointId) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|p| p.into_inner());
        if let Some(endpoint) = endpoints.get_mut(&id) {
            let health = &mut endpoint.health;
            health.consecutive_failures += 1;
            health.total_deliveries += 1;
            health.total_failures += 1;
            health.last_delivery_at = Some(Timestamp::now());

            if health.consecutive_failures >= self.config.unhealthy_threshold {
                if health.status != EndpointHealthStatus::Unhealthy {
                    warn!(endpoint_id = %id, "endpoint circuit opened");
                    health.unhealthy_since = Some(Timestamp::now());
                }
                health.status = EndpointHealthStatus::Unhealthy;
            } else if health.consecutive_failures >= self.config.degraded_threshold {
                health.status = EndpointHealthStatus::Degraded;
            }
        }
    }
}

/// Event-to-endpoint matching per the dispatch contract
fn endpoint_matches(endpoint: &WebhookEndpoint, event: &GatewayEvent) -> bool {
    if !endpoint.enabled || endpoint.tenant_id != event.tenant_id {
        return false;
    }
    if !endpoint.enabled_events.contains(&event.event_type) {
        return false;
    }
    if let Some(categories) = &endpoint.enabled_categories {
        if !categories.contains(&event.category) {
            return false;
        }
    }
    if let Some(filter) = &endpoint.domain_filter {
        match &event.metadata.domain {
            Some(domain) => {
                if normalize_domain(domain) != normalize_domain(filter) {
                    return false;
                }
            }
            None => return false,
        }
    }
    let severity = event.metadata.severity.unwrap_or(Severity::Low);
    if severity < endpoint.min_severity {
        return false;
    }
    true
}

/// Jittered exponential retry delay: `min(initial × 2^(attempt-1) ×
/// (1 + jitter), max)`
fn retry_delay(attempt: u32, initial_ms: u64, max_ms: u64, jitter_fraction: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let base = initial_ms as f64 * 2f64.powi(exponent as i32);
    let jitter = if jitter_fraction > 0.0 {
        rand::thread_rng().gen_range(-jitter_fraction..=jitter_fraction)
    } else {
        0.0
    };
    let with_jitter = (base * (1.0 + jitter)).max(0.0);
    Duration::from_millis(with_jitter.min(max_ms as f64) as u64)
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
