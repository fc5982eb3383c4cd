//! # Learned API Patterns
//!
//! Data model and registry for the pattern subsystem: learned URL-to-API
//! shortcuts, their metrics, anti-pattern suppressions, and health tracking.
//!
//! A pattern maps a family of page URLs (regular expressions) onto a direct
//! API endpoint template. Applying a pattern skips the HTML tiers entirely,
//! which is why pattern quality is tracked so aggressively: confidence moves
//! on every application, repeated failures harden into anti-patterns, and a
//! rolling health classification feeds webhook notifications.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::{AntiPatternId, FailureCategory, PatternId, Timestamp};

mod anti_pattern;
mod health;
mod inference;
mod registry;
mod store;

pub use anti_pattern::{AntiPatternConfig, AntiPatternStore, RecommendedAction};
pub use health::{HealthMonitor, HealthMonitorConfig, HealthTransition};
pub use inference::{
    bootstrap_patterns, ContentMapper, DefaultContentMapper, DefaultVariableExtractor,
    InferenceError, InferredTemplate, MappedContent, SuccessObservation, TemplateInference,
    VariableExtraction, builtin_inferences,
};
pub use registry::{
    ApplicationError, ApplicationOutcome, PatternRegistry, RegistryConfig, RegistryStats,
};
pub use store::{load_registry_file, save_registry_file, Debouncer, PersistedRegistry, StoreError};

/// Bound on the `recent_failures` ring per pattern
pub const RECENT_FAILURES_CAP: usize = 20;

// ============================================================================
// Template Taxonomy
// ============================================================================

/// Shape family of a learned pattern.
///
/// The tag selects the inference/extraction behavior at learn time and keeps
/// the match hot path branchless: everything the matcher needs is already
/// materialized on the pattern.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    /// Appending `.json` to the page URL yields the API document
    JsonSuffix,
    /// A package-registry style lookup keyed by a name in the path
    RegistryLookup,
    /// A REST resource addressed by a numeric or slug identifier
    RestResource,
    /// A Firebase-style `*.firebaseio.com/....json` endpoint
    FirebaseRest,
    /// A query-string API whose parameter values come from the page path
    QueryApi,
}

impl TemplateType {
    /// All template types in declaration order
    pub const ALL: [TemplateType; 5] = [
        Self::JsonSuffix,
        Self::RegistryLookup,
        Self::RestResource,
        Self::FirebaseRest,
        Self::QueryApi,
    ];

    /// Get string representation matching the wire format
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonSuffix => "json-suffix",
            Self::RegistryLookup => "registry-lookup",
            Self::RestResource => "rest-resource",
            Self::FirebaseRest => "firebase-rest",
            Self::QueryApi => "query-api",
        }
    }
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response body format a pattern expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Xml,
    Html,
}

// ============================================================================
// Extraction
// ============================================================================

/// Where a template variable is pulled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorSource {
    Path,
    Query,
    Subdomain,
    Hostname,
}

/// Optional post-processing applied to an extracted variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarTransform {
    Lowercase,
    Uppercase,
    UrlEncode,
}

/// One template-variable extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarExtractor {
    /// Template variable name, matching a `{name}` placeholder
    pub name: String,

    /// Which URL component the regex runs against
    pub source: ExtractorSource,

    /// Regular expression with at least `group` capture groups
    pub regex: String,

    /// Capture group index holding the value
    pub group: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<VarTransform>,
}

// ============================================================================
// Content Mapping and Validation
// ============================================================================

/// Paths (dot-separated into the parsed response) mapping API fields onto
/// canonical content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMapping {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Validation rules applied to an application response before it is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternValidation {
    /// Dot-separated paths that must resolve in the parsed response
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Minimum mapped content length in characters
    #[serde(default)]
    pub min_content_length: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_time_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_content_type: Option<String>,
}

impl Default for PatternValidation {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            min_content_length: 0,
            max_response_time_ms: None,
            expected_content_type: None,
        }
    }
}

// ============================================================================
// Failure Records and Metrics
// ============================================================================

/// One recorded application failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: Timestamp,
    pub category: FailureCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    pub message: String,
    pub domain: String,
    pub attempted_url: String,
    pub pattern_id: PatternId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Rolling quality metrics for one pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetrics {
    pub success_count: u64,
    pub failure_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,

    /// Trust in the pattern, clamped to [0, 1]
    pub confidence: f64,

    /// Domains the pattern has been applied on
    #[serde(default)]
    pub domains: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time_ms: Option<f64>,

    /// Failure counts per category; sums to `failure_count`
    #[serde(default)]
    pub failures_by_category: BTreeMap<FailureCategory, u64>,

    /// Bounded ring of the most recent failures
    #[serde(default)]
    pub recent_failures: VecDeque<FailureRecord>,

    /// Suppressions currently naming this pattern
    #[serde(default)]
    pub active_anti_patterns: BTreeSet<AntiPatternId>,
}

impl PatternMetrics {
    /// Fresh metrics at the given starting confidence
    pub fn starting_at(confidence: f64) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            last_success: None,
            last_failure: None,
            last_failure_reason: None,
            confidence: confidence.clamp(0.0, 1.0),
            domains: BTreeSet::new(),
            avg_response_time_ms: None,
            failures_by_category: BTreeMap::new(),
            recent_failures: VecDeque::new(),
            active_anti_patterns: BTreeSet::new(),
        }
    }

    /// Record a successful application
    pub fn record_success(&mut self, response_time_ms: u64, domain: &str, now: Timestamp) {
        self.success_count += 1;
        self.last_success = Some(now);
        self.domains.insert(domain.to_string());
        self.confidence = (self.confidence + 0.05 * (1.0 - self.confidence)).min(1.0);

        // Running mean keeps the field stable under persistence round-trips
        let observed = response_time_ms as f64;
        self.avg_response_time_ms = Some(match self.avg_response_time_ms {
            Some(avg) => {
                let n = self.success_count as f64;
                avg + (observed - avg) / n
            }
            None => observed,
        });
    }

    /// Record a failed application
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failure_count += 1;
        self.last_failure = Some(record.timestamp);
        self.last_failure_reason = Some(record.message.clone());
        self.domains.insert(record.domain.clone());
        self.confidence = (self.confidence - 0.1).max(0.0);

        *self.failures_by_category.entry(record.category).or_insert(0) += 1;

        self.recent_failures.push_back(record);
        while self.recent_failures.len() > RECENT_FAILURES_CAP {
            self.recent_failures.pop_front();
        }
    }

    /// Total categorized failures; equals `failure_count` when every failure
    /// was categorized exactly once
    pub fn categorized_failures(&self) -> u64 {
        self.failures_by_category.values().sum()
    }
}

impl Default for PatternMetrics {
    fn default() -> Self {
        Self::starting_at(0.5)
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// A learned or bootstrapped URL-to-API shortcut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPattern {
    pub id: PatternId,
    pub template_type: TemplateType,

    /// Ordered regular expressions matched against the full URL
    pub url_patterns: Vec<String>,

    /// Endpoint with `{var}` placeholders filled from the extractors
    pub endpoint_template: String,

    #[serde(default)]
    pub extractors: Vec<VarExtractor>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    pub response_format: ResponseFormat,
    pub content_mapping: ContentMapping,

    #[serde(default)]
    pub validation: PatternValidation,

    #[serde(default)]
    pub metrics: PatternMetrics,

    /// Patterns to try when this one fails; ids, resolved lazily
    #[serde(default)]
    pub fallback_patterns: Vec<PatternId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Timestamp>,

    /// Archived patterns are excluded from matching but retained for stats
    #[serde(default)]
    pub archived: bool,

    /// When confidence first fell below the archive threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below_threshold_since: Option<Timestamp>,

    /// Last time periodic decay touched this pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decay_at: Option<Timestamp>,
}

impl ApiPattern {
    /// Specificity score used to break confidence ties: longer expressions
    /// with more literal characters win
    pub fn specificity(&self) -> usize {
        self.url_patterns
            .iter()
            .map(|p| {
                let literals = p
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '/' || *c == '.')
                    .count();
                p.len() + literals
            })
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// Anti-Patterns
// ============================================================================

/// A learned suppression telling the matcher to skip a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPattern {
    pub id: AntiPatternId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pattern_id: Option<PatternId>,

    pub domains: BTreeSet<String>,

    #[serde(default)]
    pub url_patterns: Vec<String>,

    pub failure_category: FailureCategory,
    pub reason: String,
    pub recommended_action: RecommendedAction,

    /// Zero means indefinite suppression
    pub suppression_duration_ms: u64,

    pub created_at: Timestamp,

    /// Unix milliseconds; zero means never expires
    pub expires_at_ms: i64,

    pub failure_count: u64,
    pub last_failure: Timestamp,
}

impl AntiPattern {
    /// Whether the suppression is still in force at `now`
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at_ms == 0 || now.unix_ms() < self.expires_at_ms
    }
}

// ============================================================================
// Health
// ============================================================================

/// Coarse health classification of a pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failing,
    Broken,
}

impl HealthStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failing => "failing",
            Self::Broken => "broken",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One point-in-time success-rate sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: Timestamp,
    pub success_rate: f64,
    pub sample_size: u32,
}

/// Rolling health state for one pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHealth {
    pub status: HealthStatus,
    pub current_success_rate: f64,

    /// Bounded snapshot ring, newest last
    pub history: VecDeque<HealthSnapshot>,

    pub last_health_check: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation_detected_at: Option<Timestamp>,

    pub consecutive_failures: u32,
}

// ============================================================================
// Match Results and Events
// ============================================================================

/// One candidate produced by [`PatternRegistry::match_url`]
#[derive(Debug, Clone)]
pub struct PatternMatch {
    /// Snapshot copy of the pattern at match time
    pub pattern: ApiPattern,

    pub extracted_vars: HashMap<String, String>,

    /// Endpoint with all placeholders substituted
    pub api_endpoint: String,

    /// Effective confidence (stored confidence × age decay)
    pub confidence: f64,
}

/// Events emitted by the registry for telemetry and webhook fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternEvent {
    PatternLearned {
        pattern_id: PatternId,
        template_type: TemplateType,
        domain: String,
    },
    PatternApplied {
        pattern_id: PatternId,
        success: bool,
    },
    PatternUpdated {
        pattern_id: PatternId,
        confidence: f64,
    },
    ConfidenceDecayed {
        pattern_id: PatternId,
        confidence: f64,
    },
    PatternArchived {
        pattern_id: PatternId,
    },
    AntiPatternCreated {
        anti_pattern_id: AntiPatternId,
        pattern_id: Option<PatternId>,
        category: FailureCategory,
        domain: String,
    },
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
