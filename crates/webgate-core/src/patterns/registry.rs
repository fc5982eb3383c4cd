//! # Pattern Registry
//!
//! In-memory registry of learned API patterns: matching, application,
//! learning, transfer, confidence decay, and archival.
//!
//! Patterns live behind per-record mutexes; reads snapshot the record under
//! its lock and work on the copy. The domain and template-type indices sit
//! behind a registry-wide read-mostly lock and are rebuilt on mutation.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::{
    builtin_inferences, AntiPatternStore, ApiPattern, ContentMapper, Debouncer,
    DefaultContentMapper, DefaultVariableExtractor, FailureRecord, MappedContent, PatternEvent,
    PatternMatch, PersistedRegistry, ResponseFormat, SuccessObservation, TemplateInference,
    TemplateType, VariableExtraction,
};
use crate::scheduler::normalize_domain;
use crate::{FailureCategory, PatternId, Timestamp};

// ============================================================================
// Configuration
// ============================================================================

/// Registry tuning knobs
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Confidence assigned to freshly learned patterns
    pub learn_confidence: f64,

    /// Patterns below this confidence are candidates for archival
    pub min_confidence_threshold: f64,

    /// How long a pattern may sit below the threshold before archival
    pub archive_after: Duration,

    /// Minimum similarity for cross-site transfer
    pub min_similarity: f64,

    /// Confidence multiplier applied to transferred patterns
    pub transfer_decay: f64,

    /// Grace period before unused patterns start decaying
    pub unused_grace: Duration,

    /// Confidence lost per day past the grace period
    pub daily_decay: f64,

    /// Debounce window for persistence
    pub persist_debounce: Duration,

    /// Per-application HTTP timeout
    pub apply_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            learn_confidence: 0.5,
            min_confidence_threshold: 0.2,
            archive_after: Duration::from_secs(14 * 24 * 3600),
            min_similarity: 0.3,
            transfer_decay: 0.5,
            unused_grace: Duration::from_secs(7 * 24 * 3600),
            daily_decay: 0.01,
            persist_debounce: Duration::from_secs(1),
            apply_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Application Results
// ============================================================================

/// Successful outcome of applying a pattern
#[derive(Debug, Clone)]
pub struct ApplicationOutcome {
    pub endpoint: String,
    pub status: u16,
    pub response_time_ms: u64,
    pub content: MappedContent,
    pub raw_body: String,

    /// Parsed JSON document, when the response format was JSON
    pub structured: Option<serde_json::Value>,
}

/// Failed application, already categorized
#[derive(Debug, Clone, thiserror::Error)]
#[error("pattern application failed ({category}): {message}")]
pub struct ApplicationError {
    pub category: FailureCategory,
    pub message: String,
    pub status_code: Option<u16>,
}

// ============================================================================
// Stats
// ============================================================================

/// Aggregate registry statistics for the tool surface
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub by_type: BTreeMap<TemplateType, usize>,
    pub mean_confidence: f64,
}

// ============================================================================
// Internal Record and Indices
// ============================================================================

#[derive(Debug)]
struct PatternRecord {
    pattern: ApiPattern,
    compiled: Vec<regex::Regex>,
}

impl PatternRecord {
    fn new(pattern: ApiPattern) -> Self {
        let compiled = pattern
            .url_patterns
            .iter()
            .filter_map(|raw| match regex::Regex::new(raw) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern_id = %pattern.id, error = %e, "dropping malformed url pattern");
                    None
                }
            })
            .collect();
        Self { pattern, compiled }
    }
}

#[derive(Debug, Default)]
struct Indices {
    by_domain: HashMap<String, Vec<PatternId>>,
    by_type: HashMap<TemplateType, Vec<PatternId>>,

    /// Active pattern ids ordered by stored confidence, highest first
    ordered: Vec<PatternId>,
}

// ============================================================================
// Registry
// ============================================================================

/// Thread-safe learned-pattern registry
pub struct PatternRegistry {
    config: RegistryConfig,
    records: RwLock<HashMap<PatternId, Arc<Mutex<PatternRecord>>>>,
    indices: RwLock<Indices>,
    anti_patterns: Arc<AntiPatternStore>,
    inferences: Vec<Box<dyn TemplateInference>>,
    extraction: Box<dyn VariableExtraction>,
    mapper: Box<dyn ContentMapper>,
    events: broadcast::Sender<PatternEvent>,
    http: reqwest::Client,
    persistence: Mutex<Option<(PathBuf, Debouncer)>>,
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("patterns", &self.records.read().map(|r| r.len()).unwrap_or(0))
            .finish()
    }
}

impl PatternRegistry {
    /// Create a registry with the built-in inference set and default
    /// extraction/mapping behavior
    pub fn new(config: RegistryConfig, anti_patterns: Arc<AntiPatternStore>) -> Self {
        Self::with_components(
            config,
            anti_patterns,
            builtin_inferences(),
            Box::new(DefaultVariableExtractor),
            Box::new(DefaultContentMapper),
        )
    }

    /// Create a registry with injected capability implementations
    pub fn with_components(
        config: RegistryConfig,
        anti_patterns: Arc<AntiPatternStore>,
        inferences: Vec<Box<dyn TemplateInference>>,
        extraction: Box<dyn VariableExtraction>,
        mapper: Box<dyn ContentMapper>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            records: RwLock::new(HashMap::new()),
            indices: RwLock::new(Indices::default()),
            anti_patterns,
            inferences,
            extraction,
            mapper,
            events,
            http: reqwest::Client::new(),
            persistence: Mutex::new(None),
        }
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<PatternEvent> {
        self.events.subscribe()
    }

    /// The anti-pattern store this registry consults during matching
    pub fn anti_patterns(&self) -> &Arc<AntiPatternStore> {
        &self.anti_patterns
    }

    // ------------------------------------------------------------------
    // Insertion and bootstrap
    // ------------------------------------------------------------------

    /// Insert a pattern, replacing any record with the same id
    pub fn insert(&self, pattern: ApiPattern) {
        {
            let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
            records.insert(pattern.id, Arc::new(Mutex::new(PatternRecord::new(pattern))));
        }
        self.rebuild_indices();
        self.persist_soon();
    }

    /// Seed the registry with the built-in patterns when it is empty
    pub fn bootstrap(&self) {
        let is_empty = {
            let records = self.records.read().unwrap_or_else(|p| p.into_inner());
            records.is_empty()
        };
        if !is_empty {
            return;
        }
        for pattern in super::bootstrap_patterns() {
            self.insert(pattern);
        }
        info!("pattern registry bootstrapped from built-in seeds");
    }

    /// Snapshot one pattern by id
    pub fn get(&self, id: PatternId) -> Option<ApiPattern> {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        records.get(&id).map(|record| {
            record
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .pattern
                .clone()
        })
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    /// Match a URL against every active pattern.
    ///
    /// Candidates suppressed by an active anti-pattern are dropped. The
    /// remainder is ordered by effective confidence, then regex
    /// specificity, then recency of use.
    #[instrument(skip(self))]
    pub fn match_url(&self, url: &str) -> Vec<PatternMatch> {
        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return Vec::new(),
        };
        let domain = parsed
            .host_str()
            .map(normalize_domain)
            .unwrap_or_default();
        let now = Timestamp::now();

        let candidates: Vec<Arc<Mutex<PatternRecord>>> = {
            let records = self.records.read().unwrap_or_else(|p| p.into_inner());
            let indices = self.indices.read().unwrap_or_else(|p| p.into_inner());
            indices
                .ordered
                .iter()
                .filter_map(|id| records.get(id).cloned())
                .collect()
        };

        let mut matches: Vec<(PatternMatch, usize, Option<Timestamp>)> = Vec::new();
        for record in candidates {
            let record = record.lock().unwrap_or_else(|p| p.into_inner());
            let pattern = &record.pattern;
            if pattern.archived {
                continue;
            }
            if !record.compiled.iter().any(|regex| regex.is_match(url)) {
                continue;
            }
            if self.anti_patterns.is_suppressed(pattern.id, &domain, now) {
                continue;
            }

            let mut vars = HashMap::new();
            let mut complete = true;
            for extractor in &pattern.extractors {
                match self.extraction.extract(&parsed, extractor) {
                    Some(value) => {
                        vars.insert(extractor.name.clone(), value);
                    }
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            let mut endpoint = pattern.endpoint_template.clone();
            for (name, value) in &vars {
                endpoint = endpoint.replace(&format!("{{{}}}", name), value);
            }
            if endpoint.contains('{') {
                // Unresolved placeholder: the template asks for a variable
                // no extractor provides
                continue;
            }

            let confidence = pattern.metrics.confidence * self.age_factor(pattern, now);
            matches.push((
                PatternMatch {
                    pattern: pattern.clone(),
                    extracted_vars: vars,
                    api_endpoint: endpoint,
                    confidence,
                },
                pattern.specificity(),
                pattern.last_used_at,
            ));
        }

        matches.sort_by(|a, b| {
            b.0.confidence
                .partial_cmp(&a.0.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| b.2.cmp(&a.2))
        });

        matches.into_iter().map(|(m, _, _)| m).collect()
    }

    /// Match-time staleness factor: full confidence inside the grace
    /// period, one percent off per day past it
    fn age_factor(&self, pattern: &ApiPattern, now: Timestamp) -> f64 {
        let last_used = pattern.last_used_at.unwrap_or(pattern.created_at);
        let idle = now.duration_since(last_used);
        if idle <= self.config.unused_grace {
            return 1.0;
        }
        let days_past = (idle - self.config.unused_grace).as_secs_f64() / 86_400.0;
        (1.0 - self.config.daily_decay * days_past).max(0.0)
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Apply a match: call the constructed endpoint, parse, validate, and
    /// map content.
    ///
    /// Metrics are not mutated here; the learning coordinator feeds the
    /// final fetch outcome back through [`Self::observe_success`] and
    /// [`Self::observe_failure`] exactly once per application.
    #[instrument(skip(self, matched), fields(pattern_id = %matched.pattern.id))]
    pub async fn apply(
        &self,
        matched: &PatternMatch,
    ) -> Result<ApplicationOutcome, ApplicationError> {
        let pattern = &matched.pattern;
        let started = std::time::Instant::now();

        let method = reqwest::Method::from_bytes(pattern.method.as_bytes()).map_err(|_| {
            ApplicationError {
                category: FailureCategory::Unknown,
                message: format!("pattern carries unusable method '{}'", pattern.method),
                status_code: None,
            }
        })?;

        let mut request = self
            .http
            .request(method, &matched.api_endpoint)
            .timeout(self.config.apply_timeout);
        if let Some(headers) = &pattern.headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        let response = request.send().await.map_err(|e| ApplicationError {
            category: crate::retry::RetryEngine::classify_transport(&e),
            message: e.to_string(),
            status_code: None,
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !(200..300).contains(&status) {
            return Err(ApplicationError {
                category: FailureCategory::from_http_status(status),
                message: format!("endpoint answered {}", status),
                status_code: Some(status),
            });
        }

        if let Some(expected) = &pattern.validation.expected_content_type {
            let actual = content_type.as_deref().unwrap_or_default();
            if !actual.starts_with(expected.as_str()) {
                return Err(ApplicationError {
                    category: FailureCategory::ValidationFailed,
                    message: format!(
                        "expected content type '{}', got '{}'",
                        expected, actual
                    ),
                    status_code: Some(status),
                });
            }
        }

        let body = response.text().await.map_err(|e| ApplicationError {
            category: FailureCategory::NetworkError,
            message: format!("failed to read response body: {}", e),
            status_code: Some(status),
        })?;

        let response_time_ms = started.elapsed().as_millis() as u64;
        if let Some(budget) = pattern.validation.max_response_time_ms {
            if response_time_ms > budget {
                return Err(ApplicationError {
                    category: FailureCategory::Timeout,
                    message: format!(
                        "response took {}ms against a {}ms budget",
                        response_time_ms, budget
                    ),
                    status_code: Some(status),
                });
            }
        }

        let structured = match pattern.response_format {
            ResponseFormat::Json => Some(serde_json::from_str::<serde_json::Value>(&body)
                .map_err(|e| ApplicationError {
                    category: FailureCategory::ParseError,
                    message: format!("response is not JSON: {}", e),
                    status_code: Some(status),
                })?),
            _ => None,
        };

        if let Some(doc) = &structured {
            for field in &pattern.validation.required_fields {
                if resolve_path(doc, field).is_none() {
                    return Err(ApplicationError {
                        category: FailureCategory::ValidationFailed,
                        message: format!("required field '{}' missing", field),
                        status_code: Some(status),
                    });
                }
            }
        }

        let content = self
            .mapper
            .map(pattern.response_format, &body, &pattern.content_mapping)
            .map_err(|e| ApplicationError {
                category: match e {
                    super::InferenceError::Parse { .. } => FailureCategory::ParseError,
                    super::InferenceError::MissingField { .. } => {
                        FailureCategory::ValidationFailed
                    }
                },
                message: e.to_string(),
                status_code: Some(status),
            })?;

        if content.content_length() < pattern.validation.min_content_length {
            return Err(ApplicationError {
                category: FailureCategory::ContentTooShort,
                message: format!(
                    "mapped content is {} chars, below the {} floor",
                    content.content_length(),
                    pattern.validation.min_content_length
                ),
                status_code: Some(status),
            });
        }

        Ok(ApplicationOutcome {
            endpoint: matched.api_endpoint.clone(),
            status,
            response_time_ms,
            content,
            raw_body: body,
            structured,
        })
    }

    // ------------------------------------------------------------------
    // Outcome observation
    // ------------------------------------------------------------------

    /// Record a successful application of `id`
    pub fn observe_success(&self, id: PatternId, response_time_ms: u64, domain: &str) {
        let now = Timestamp::now();
        let confidence = self.with_pattern(id, |pattern| {
            pattern.metrics.record_success(response_time_ms, domain, now);
            pattern.last_used_at = Some(now);
            pattern.updated_at = now;
            pattern.below_threshold_since = None;
            pattern.metrics.confidence
        });

        if let Some(confidence) = confidence {
            let _ = self.events.send(PatternEvent::PatternApplied {
                pattern_id: id,
                success: true,
            });
            let _ = self.events.send(PatternEvent::PatternUpdated {
                pattern_id: id,
                confidence,
            });
            self.rebuild_indices();
            self.persist_soon();
        }
    }

    /// Record a failed application of `id`
    pub fn observe_failure(&self, record: FailureRecord) {
        let id = record.pattern_id;
        let now = record.timestamp;
        let threshold = self.config.min_confidence_threshold;

        let confidence = self.with_pattern(id, |pattern| {
            pattern.metrics.record_failure(record.clone());
            pattern.last_used_at = Some(now);
            pattern.updated_at = now;
            if pattern.metrics.confidence < threshold && pattern.below_threshold_since.is_none() {
                pattern.below_threshold_since = Some(now);
            }
            pattern.metrics.confidence
        });

        if let Some(confidence) = confidence {
            let _ = self.events.send(PatternEvent::PatternApplied {
                pattern_id: id,
                success: false,
            });
            let _ = self.events.send(PatternEvent::PatternUpdated {
                pattern_id: id,
                confidence,
            });
            self.rebuild_indices();
            self.persist_soon();
        }
    }

    /// Attach an anti-pattern id to the pattern it suppresses
    pub fn note_anti_pattern(&self, id: PatternId, anti_pattern_id: crate::AntiPatternId) {
        self.with_pattern(id, |pattern| {
            pattern.metrics.active_anti_patterns.insert(anti_pattern_id);
        });
        self.persist_soon();
    }

    // ------------------------------------------------------------------
    // Learning and transfer
    // ------------------------------------------------------------------

    /// Learn a pattern from one observed success.
    ///
    /// The first inference whose shape fits wins. Returns the stored
    /// pattern, or `None` when nothing could be inferred.
    #[instrument(skip(self, observation), fields(domain = %observation.domain))]
    pub fn learn(&self, observation: &SuccessObservation) -> Option<ApiPattern> {
        let template = self
            .inferences
            .iter()
            .find_map(|inference| inference.infer(observation))?;

        let mut pattern = template.into_pattern(self.config.learn_confidence);
        pattern
            .metrics
            .domains
            .insert(normalize_domain(&observation.domain));

        info!(
            pattern_id = %pattern.id,
            template_type = %pattern.template_type,
            domain = %observation.domain,
            "learned new pattern"
        );
        let learned = pattern.clone();
        let _ = self.events.send(PatternEvent::PatternLearned {
            pattern_id: pattern.id,
            template_type: pattern.template_type,
            domain: observation.domain.clone(),
        });
        self.insert(pattern);
        Some(learned)
    }

    /// Transfer a pattern to a similar site.
    ///
    /// Refused below the similarity floor. The transferred copy starts at
    /// `confidence × transfer_decay` and carries only the target domain.
    pub fn transfer(
        &self,
        source_id: PatternId,
        target_domain: &str,
        similarity: f64,
    ) -> Option<ApiPattern> {
        if similarity < self.config.min_similarity {
            debug!(
                similarity,
                floor = self.config.min_similarity,
                "transfer refused below similarity floor"
            );
            return None;
        }

        let source = self.get(source_id)?;
        let source_domain = source
            .metrics
            .domains
            .iter()
            .next()
            .cloned()
            .or_else(|| host_of_template(&source.endpoint_template))?;
        let target = normalize_domain(target_domain);

        let mut transferred = source.clone();
        transferred.id = PatternId::new();
        transferred.url_patterns = source
            .url_patterns
            .iter()
            .map(|p| p.replace(&regex::escape(&source_domain), &regex::escape(&target)))
            .collect();
        transferred.endpoint_template = source
            .endpoint_template
            .replace(&source_domain, &target);
        transferred.metrics = super::PatternMetrics::starting_at(
            source.metrics.confidence * self.config.transfer_decay,
        );
        transferred.metrics.domains.insert(target.clone());
        transferred.fallback_patterns = vec![source_id];
        let now = Timestamp::now();
        transferred.created_at = now;
        transferred.updated_at = now;
        transferred.last_used_at = None;
        transferred.archived = false;
        transferred.below_threshold_since = None;

        let result = transferred.clone();
        let _ = self.events.send(PatternEvent::PatternLearned {
            pattern_id: transferred.id,
            template_type: transferred.template_type,
            domain: target,
        });
        self.insert(transferred);
        Some(result)
    }

    // ------------------------------------------------------------------
    // Decay and archival
    // ------------------------------------------------------------------

    /// Periodic tick: decay unused patterns and archive the persistently
    /// untrusted ones
    pub fn decay(&self) {
        let now = Timestamp::now();
        let mut touched = false;

        let ids: Vec<PatternId> = {
            let records = self.records.read().unwrap_or_else(|p| p.into_inner());
            records.keys().copied().collect()
        };

        for id in ids {
            let mut decayed_to = None;
            let mut archived = false;

            self.with_pattern(id, |pattern| {
                if pattern.archived {
                    return;
                }

                let last_used = pattern.last_used_at.unwrap_or(pattern.created_at);
                let idle = now.duration_since(last_used);
                if idle > self.config.unused_grace {
                    let since = pattern
                        .last_decay_at
                        .unwrap_or(last_used.add_duration(self.config.unused_grace));
                    let days = now.duration_since(since).as_secs_f64() / 86_400.0;
                    if days >= 1.0 {
                        let whole_days = days.floor();
                        pattern.metrics.confidence = (pattern.metrics.confidence
                            - self.config.daily_decay * whole_days)
                            .max(0.0);
                        pattern.last_decay_at = Some(since.add_duration(
                            Duration::from_secs((whole_days as u64) * 86_400),
                        ));
                        decayed_to = Some(pattern.metrics.confidence);
                    }
                }

                if pattern.metrics.confidence < self.config.min_confidence_threshold {
                    let since = *pattern.below_threshold_since.get_or_insert(now);
                    if now.duration_since(since) > self.config.archive_after {
                        pattern.archived = true;
                        archived = true;
                    }
                } else {
                    pattern.below_threshold_since = None;
                }
            });

            if let Some(confidence) = decayed_to {
                touched = true;
                let _ = self.events.send(PatternEvent::ConfidenceDecayed {
                    pattern_id: id,
                    confidence,
                });
            }
            if archived {
                touched = true;
                let _ = self
                    .events
                    .send(PatternEvent::PatternArchived { pattern_id: id });
            }
        }

        if touched {
            self.rebuild_indices();
            self.persist_soon();
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Active (non-archived) patterns known for a domain
    pub fn patterns_for_domain(&self, domain: &str) -> Vec<ApiPattern> {
        let key = normalize_domain(domain);
        let ids: Vec<PatternId> = {
            let indices = self.indices.read().unwrap_or_else(|p| p.into_inner());
            indices.by_domain.get(&key).cloned().unwrap_or_default()
        };
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Active patterns of one template family
    pub fn patterns_of_type(&self, template_type: TemplateType) -> Vec<ApiPattern> {
        let ids: Vec<PatternId> = {
            let indices = self.indices.read().unwrap_or_else(|p| p.into_inner());
            indices
                .by_type
                .get(&template_type)
                .cloned()
                .unwrap_or_default()
        };
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> RegistryStats {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let mut stats = RegistryStats {
            total: records.len(),
            active: 0,
            archived: 0,
            by_type: BTreeMap::new(),
            mean_confidence: 0.0,
        };

        let mut confidence_sum = 0.0;
        for record in records.values() {
            let record = record.lock().unwrap_or_else(|p| p.into_inner());
            if record.pattern.archived {
                stats.archived += 1;
                continue;
            }
            stats.active += 1;
            confidence_sum += record.pattern.metrics.confidence;
            *stats.by_type.entry(record.pattern.template_type).or_insert(0) += 1;
        }
        if stats.active > 0 {
            stats.mean_confidence = confidence_sum / stats.active as f64;
        }
        stats
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Snapshot the registry for persistence
    pub fn snapshot(&self) -> PersistedRegistry {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let mut patterns: Vec<ApiPattern> = records
            .values()
            .map(|record| {
                record
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .pattern
                    .clone()
            })
            .collect();
        patterns.sort_by_key(|p| p.id.as_str());
        PersistedRegistry::new(patterns, self.anti_patterns.list())
    }

    /// Replace registry contents from a persisted snapshot
    pub fn restore(&self, snapshot: PersistedRegistry) {
        {
            let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
            records.clear();
            for pattern in snapshot.patterns {
                records.insert(pattern.id, Arc::new(Mutex::new(PatternRecord::new(pattern))));
            }
        }
        self.anti_patterns.restore(snapshot.anti_patterns);
        self.rebuild_indices();
    }

    /// Wire the registry to a state file with a debounced writer.
    ///
    /// Mutations after this call schedule an atomic write within the
    /// configured debounce window.
    pub fn enable_persistence(self: &Arc<Self>, path: PathBuf) {
        let weak = Arc::downgrade(self);
        let write_path = path.clone();
        let debouncer = Debouncer::spawn(self.config.persist_debounce, move || {
            let weak = weak.clone();
            let path = write_path.clone();
            async move {
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                let snapshot = registry.snapshot();
                if let Err(e) = super::save_registry_file(&path, &snapshot).await {
                    warn!(error = %e, "failed to persist pattern registry");
                }
            }
        });

        let mut persistence = self.persistence.lock().unwrap_or_else(|p| p.into_inner());
        *persistence = Some((path, debouncer));
    }

    /// Force any pending persistence to disk
    pub async fn flush(&self) {
        let debouncer = {
            let persistence = self.persistence.lock().unwrap_or_else(|p| p.into_inner());
            persistence.as_ref().map(|(_, d)| d.clone())
        };
        if let Some(debouncer) = debouncer {
            debouncer.flush().await;
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn with_pattern<R>(
        &self,
        id: PatternId,
        mutate: impl FnOnce(&mut ApiPattern) -> R,
    ) -> Option<R> {
        let record = {
            let records = self.records.read().unwrap_or_else(|p| p.into_inner());
            records.get(&id).cloned()
        }?;
        let mut record = record.lock().unwrap_or_else(|p| p.into_inner());
        Some(mutate(&mut record.pattern))
    }

    fn rebuild_indices(&self) {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());

        let mut by_domain: HashMap<String, Vec<PatternId>> = HashMap::new();
        let mut by_type: HashMap<TemplateType, Vec<PatternId>> = HashMap::new();
        let mut ordered: Vec<(PatternId, f64)> = Vec::new();

        for record in records.values() {
            let record = record.lock().unwrap_or_else(|p| p.into_inner());
            let pattern = &record.pattern;
            if pattern.archived {
                continue;
            }
            for domain in &pattern.metrics.domains {
                by_domain.entry(domain.clone()).or_default().push(pattern.id);
            }
            if let Some(host) = host_of_template(&pattern.endpoint_template) {
                let entry = by_domain.entry(host).or_default();
                if !entry.contains(&pattern.id) {
                    entry.push(pattern.id);
                }
            }
            by_type
                .entry(pattern.template_type)
                .or_default()
                .push(pattern.id);
            ordered.push((pattern.id, pattern.metrics.confidence));
        }
        drop(records);

        ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut indices = self.indices.write().unwrap_or_else(|p| p.into_inner());
        indices.by_domain = by_domain;
        indices.by_type = by_type;
        indices.ordered = ordered.into_iter().map(|(id, _)| id).collect();
    }

    fn persist_soon(&self) {
        let persistence = self.persistence.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((_, debouncer)) = persistence.as_ref() {
            debouncer.mark_dirty();
        }
    }
}

/// Resolve a dot-separated path in a JSON document
fn resolve_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Host of an endpoint template, with placeholders neutralized.
///
/// Placeholders become a path separator plus filler so a `{path}` that
/// directly follows the host cannot corrupt it.
fn host_of_template(template: &str) -> Option<String> {
    static PLACEHOLDER: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let placeholder = PLACEHOLDER
        .get_or_init(|| regex::Regex::new(r"\{[^}]*\}").expect("placeholder regex is valid"));
    let neutral = placeholder.replace_all(template, "/x");
    url::Url::parse(&neutral)
        .ok()
        .and_then(|u| u.host_str().map(normalize_domain))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
