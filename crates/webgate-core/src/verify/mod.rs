//! # Verification Pipeline
//!
//! Declarative checks applied to a candidate fetch result before it is
//! accepted.
//!
//! Built-in modes supply a base check list; learned per-domain checks and
//! caller checks append to it. Checks run in order, each yielding an
//! outcome with a severity; error and critical failures fail the result and
//! scale the confidence score down.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::fetch::{FetchResult, OnFailure};
use crate::FailureCategory;

mod learned;

pub use learned::{LearnedCheckStore, LearnedCheckStoreConfig};

// ============================================================================
// Modes and Severities
// ============================================================================

/// Built-in verification depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Status 200 and a minimal content floor
    #[default]
    Basic,
    /// Basic plus block-page phrase exclusions
    Standard,
    /// Standard plus a warning-level length floor
    Thorough,
}

/// Severity of one failed check
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Warning,
    Error,
    Critical,
}

// ============================================================================
// Checks
// ============================================================================

/// Content-field predicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCheckKind {
    FieldExists,
    FieldNotEmpty,
    FieldMatches { pattern: String },
    MinLength { chars: usize },
    MaxLength { chars: usize },
}

/// Response-level predicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCheckKind {
    StatusCode { expected: u16 },
    ContainsText { needle: String },
    ExcludesText { needle: String },
}

/// One declarative check
#[derive(Clone)]
pub enum CheckSpec {
    /// Predicate over a named result field
    Content {
        name: String,
        field: String,
        kind: ContentCheckKind,
        severity: CheckSeverity,
    },

    /// Predicate over the response as a whole
    Action {
        name: String,
        kind: ActionCheckKind,
        severity: CheckSeverity,
    },

    /// Probe a secondary URL and require success
    State {
        name: String,
        url: String,
        severity: CheckSeverity,
    },

    /// Arbitrary caller-supplied predicate
    Custom {
        name: String,
        severity: CheckSeverity,
        check: Arc<dyn Fn(&FetchResult) -> bool + Send + Sync>,
    },
}

impl CheckSpec {
    /// Stable name used for learned-check attribution
    pub fn name(&self) -> &str {
        match self {
            Self::Content { name, .. }
            | Self::Action { name, .. }
            | Self::State { name, .. }
            | Self::Custom { name, .. } => name,
        }
    }

    fn severity(&self) -> CheckSeverity {
        match self {
            Self::Content { severity, .. }
            | Self::Action { severity, .. }
            | Self::State { severity, .. }
            | Self::Custom { severity, .. } => *severity,
        }
    }
}

impl std::fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content { name, field, kind, .. } => f
                .debug_struct("Content")
                .field("name", name)
                .field("field", field)
                .field("kind", kind)
                .finish(),
            Self::Action { name, kind, .. } => f
                .debug_struct("Action")
                .field("name", name)
                .field("kind", kind)
                .finish(),
            Self::State { name, url, .. } => f
                .debug_struct("State")
                .field("name", name)
                .field("url", url)
                .finish(),
            Self::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish()
            }
        }
    }
}

/// Outcome of one executed check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: CheckSeverity,
}

/// One structured-data schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
    pub keyword: String,
}

/// Full verification report for one candidate result
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub passed: bool,

    /// `(passed / total)` scaled down by the worst failure severity
    pub confidence: f64,

    pub outcomes: Vec<CheckOutcome>,
    pub schema_violations: Vec<SchemaViolation>,

    /// What the caller asked to happen on failure
    pub on_failure: OnFailure,
}

impl VerificationReport {
    /// Failure category the retry engine should reason about
    pub fn failure_category(&self) -> FailureCategory {
        let length_failure = self.outcomes.iter().any(|o| {
            !o.passed
                && o.severity >= CheckSeverity::Error
                && o.name.contains("length")
        });
        if length_failure {
            FailureCategory::ContentTooShort
        } else {
            FailureCategory::ValidationFailed
        }
    }
}

// ============================================================================
// Probes
// ============================================================================

/// Executes state checks against secondary URLs.
///
/// The engine injects an HTTP-backed probe; tests inject doubles.
#[async_trait::async_trait]
pub trait StateProbe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

/// Probe that issues a GET and requires a 2xx answer
pub struct HttpStateProbe {
    client: reqwest::Client,
}

impl HttpStateProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpStateProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateProbe for HttpStateProbe {
    async fn probe(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// ============================================================================
// Built-in Check Lists
// ============================================================================

/// Phrases whose presence marks a block page
const BLOCK_PHRASES: [&str; 2] = ["access denied", "rate limit exceeded"];

/// Build the check list for a built-in mode
pub fn builtin_checks(mode: VerificationMode) -> Vec<CheckSpec> {
    let mut checks = vec![
        CheckSpec::Action {
            name: "status_ok".to_string(),
            kind: ActionCheckKind::StatusCode { expected: 200 },
            severity: CheckSeverity::Error,
        },
        CheckSpec::Content {
            name: "content_min_length".to_string(),
            field: "content".to_string(),
            kind: ContentCheckKind::MinLength { chars: 50 },
            severity: CheckSeverity::Error,
        },
    ];

    if matches!(
        mode,
        VerificationMode::Standard | VerificationMode::Thorough
    ) {
        for phrase in BLOCK_PHRASES {
            checks.push(CheckSpec::Action {
                name: format!("excludes_{}", phrase.replace(' ', "_")),
                kind: ActionCheckKind::ExcludesText {
                    needle: phrase.to_string(),
                },
                severity: CheckSeverity::Error,
            });
        }
    }

    if mode == VerificationMode::Thorough {
        checks.push(CheckSpec::Content {
            name: "content_substantial_length".to_string(),
            field: "content".to_string(),
            kind: ContentCheckKind::MinLength { chars: 100 },
            severity: CheckSeverity::Warning,
        });
    }

    checks
}

// ============================================================================
// Verifier
// ============================================================================

/// Runs check lists against candidate results
pub struct Verifier {
    probe: Arc<dyn StateProbe>,
}

impl Verifier {
    /// Verifier with the HTTP state probe
    pub fn new() -> Self {
        Self {
            probe: Arc::new(HttpStateProbe::new()),
        }
    }

    /// Verifier with an injected probe
    pub fn with_probe(probe: Arc<dyn StateProbe>) -> Self {
        Self { probe }
    }

    /// Run `checks` in order against `result`, then the optional draft-07
    /// schema against its structured data.
    pub async fn verify(
        &self,
        result: &FetchResult,
        checks: &[CheckSpec],
        schema: Option<&serde_json::Value>,
        on_failure: OnFailure,
    ) -> VerificationReport {
        let mut outcomes = Vec::with_capacity(checks.len());
        for check in checks {
            outcomes.push(self.run_check(result, check).await);
        }

        let schema_violations = match (schema, &result.structured_data) {
            (Some(schema), Some(data)) => validate_schema(schema, data),
            (Some(_), None) => vec![SchemaViolation {
                path: "".to_string(),
                message: "result carries no structured data to validate".to_string(),
                keyword: "type".to_string(),
            }],
            _ => Vec::new(),
        };

        let total = outcomes.len().max(1);
        let passed_count = outcomes.iter().filter(|o| o.passed).count();
        let any_critical = outcomes
            .iter()
            .any(|o| !o.passed && o.severity == CheckSeverity::Critical);
        let any_error = outcomes
            .iter()
            .any(|o| !o.passed && o.severity == CheckSeverity::Error);

        let scale = if any_critical {
            0.3
        } else if any_error {
            0.6
        } else {
            1.0
        };
        let confidence = (passed_count as f64 / total as f64) * scale;

        let passed = !any_critical && !any_error && schema_violations.is_empty();

        VerificationReport {
            passed,
            confidence,
            outcomes,
            schema_violations,
            on_failure,
        }
    }

    async fn run_check(&self, result: &FetchResult, check: &CheckSpec) -> CheckOutcome {
        let (passed, message) = match check {
            CheckSpec::Content { field, kind, .. } => content_check(result, field, kind),
            CheckSpec::Action { kind, .. } => action_check(result, kind),
            CheckSpec::State { url, .. } => {
                let ok = self.probe.probe(url).await;
                (
                    ok,
                    if ok {
                        format!("secondary probe of {} succeeded", url)
                    } else {
                        format!("secondary probe of {} failed", url)
                    },
                )
            }
            CheckSpec::Custom { check, .. } => {
                let ok = check(result);
                (
                    ok,
                    if ok {
                        "custom check passed".to_string()
                    } else {
                        "custom check failed".to_string()
                    },
                )
            }
        };

        CheckOutcome {
            name: check.name().to_string(),
            passed,
            message,
            severity: check.severity(),
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Check Execution
// ============================================================================

/// Resolve a named field of the result to text.
///
/// `content` is the longer of markdown and text, matching the built-in
/// length floors.
fn field_text(result: &FetchResult, field: &str) -> Option<String> {
    match field {
        "content" => {
            let markdown = &result.content.markdown;
            let text = &result.content.text;
            Some(if markdown.len() >= text.len() {
                markdown.clone()
            } else {
                text.clone()
            })
        }
        "markdown" => Some(result.content.markdown.clone()),
        "text" => Some(result.content.text.clone()),
        "html" => result.content.html.clone(),
        "final_url" => Some(result.final_url.clone()),
        path => {
            let data = result.structured_data.as_ref()?;
            let mut current = data;
            for segment in path.split('.') {
                current = match current {
                    serde_json::Value::Object(map) => map.get(segment)?,
                    serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                    _ => return None,
                };
            }
            Some(match current {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
    }
}

fn content_check(
    result: &FetchResult,
    field: &str,
    kind: &ContentCheckKind,
) -> (bool, String) {
    let value = field_text(result, field);
    match kind {
        ContentCheckKind::FieldExists => (
            value.is_some(),
            format!("field '{}' {}", field, presence(&value)),
        ),
        ContentCheckKind::FieldNotEmpty => {
            let ok = value.as_deref().is_some_and(|v| !v.trim().is_empty());
            (ok, format!("field '{}' {}", field, presence(&value)))
        }
        ContentCheckKind::FieldMatches { pattern } => match regex::Regex::new(pattern) {
            Ok(regex) => {
                let ok = value.as_deref().is_some_and(|v| regex.is_match(v));
                (ok, format!("field '{}' match against /{}/", field, pattern))
            }
            Err(e) => (false, format!("check pattern does not parse: {}", e)),
        },
        ContentCheckKind::MinLength { chars } => {
            let len = value.as_deref().map_or(0, str::len);
            (
                len >= *chars,
                format!("field '{}' length {} against floor {}", field, len, chars),
            )
        }
        ContentCheckKind::MaxLength { chars } => {
            let len = value.as_deref().map_or(0, str::len);
            (
                len <= *chars,
                format!("field '{}' length {} against ceiling {}", field, len, chars),
            )
        }
    }
}

fn presence(value: &Option<String>) -> &'static str {
    match value {
        Some(v) if !v.trim().is_empty() => "is present",
        Some(_) => "is empty",
        None => "is missing",
    }
}

fn action_check(result: &FetchResult, kind: &ActionCheckKind) -> (bool, String) {
    match kind {
        ActionCheckKind::StatusCode { expected } => (
            result.http_status == *expected,
            format!("status {} against expected {}", result.http_status, expected),
        ),
        ActionCheckKind::ContainsText { needle } => {
            let haystack = combined_text(result);
            (
                haystack.contains(&needle.to_lowercase()),
                format!("content contains '{}'", needle),
            )
        }
        ActionCheckKind::ExcludesText { needle } => {
            let haystack = combined_text(result);
            (
                !haystack.contains(&needle.to_lowercase()),
                format!("content excludes '{}'", needle),
            )
        }
    }
}

fn combined_text(result: &FetchResult) -> String {
    format!("{} {}", result.content.markdown, result.content.text).to_lowercase()
}

// ============================================================================
// Schema Validation
// ============================================================================

/// Validate structured data against a draft-07 JSON Schema
pub fn validate_schema(
    schema: &serde_json::Value,
    data: &serde_json::Value,
) -> Vec<SchemaViolation> {
    let validator = match jsonschema::draft7::new(schema) {
        Ok(validator) => validator,
        Err(e) => {
            return vec![SchemaViolation {
                path: "".to_string(),
                message: format!("schema does not compile: {}", e),
                keyword: "schema".to_string(),
            }]
        }
    };

    validator
        .iter_errors(data)
        .map(|error| {
            let schema_path = error.schema_path().to_string();
            let keyword = schema_path
                .rsplit('/')
                .next()
                .unwrap_or("unknown")
                .to_string();
            SchemaViolation {
                path: error.instance_path().to_string(),
                message: error.to_string(),
                keyword,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
