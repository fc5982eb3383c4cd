//! # Template Inference and Mapping
//!
//! The three pluggable behaviors the pattern system depends on:
//!
//! - [`TemplateInference`] derives a pattern template from one observed
//!   success (a page URL plus the API endpoint that served its content)
//! - [`VariableExtraction`] pulls template variables out of a URL
//! - [`ContentMapper`] maps a parsed API response onto canonical content
//!
//! The registry takes each by value and dispatches by `template_type` tag,
//! so the match hot path never branches on behavior.

use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

use super::{
    ApiPattern, ContentMapping, ExtractorSource, PatternMetrics, PatternValidation,
    ResponseFormat, TemplateType, VarExtractor, VarTransform,
};
use crate::{PatternId, Timestamp};

// ============================================================================
// Errors
// ============================================================================

/// Error type for mapping failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("response body does not parse: {message}")]
    Parse { message: String },

    #[error("mapped field '{path}' is missing from the response")]
    MissingField { path: String },
}

// ============================================================================
// Observations and Inferred Templates
// ============================================================================

/// One observed success the learner can generalize from
#[derive(Debug, Clone)]
pub struct SuccessObservation {
    /// The page URL the client asked for
    pub page_url: String,

    /// The API endpoint observed to serve the page's content
    pub api_url: String,

    /// Content type of the API response, when known
    pub content_type: Option<String>,

    /// Registrable domain of the page
    pub domain: String,
}

/// Template shape produced by an inference
#[derive(Debug, Clone)]
pub struct InferredTemplate {
    pub template_type: TemplateType,
    pub url_patterns: Vec<String>,
    pub endpoint_template: String,
    pub extractors: Vec<VarExtractor>,
    pub response_format: ResponseFormat,
    pub content_mapping: ContentMapping,
}

impl InferredTemplate {
    /// Materialize the template as a fresh pattern at learning confidence
    pub fn into_pattern(self, confidence: f64) -> ApiPattern {
        let now = Timestamp::now();
        ApiPattern {
            id: PatternId::new(),
            template_type: self.template_type,
            url_patterns: self.url_patterns,
            endpoint_template: self.endpoint_template,
            extractors: self.extractors,
            method: "GET".to_string(),
            headers: None,
            response_format: self.response_format,
            content_mapping: self.content_mapping,
            validation: PatternValidation {
                min_content_length: 10,
                ..Default::default()
            },
            metrics: PatternMetrics::starting_at(confidence),
            fallback_patterns: Vec::new(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
            archived: false,
            below_threshold_since: None,
            last_decay_at: None,
        }
    }
}

/// Derive a pattern template from an observed success
pub trait TemplateInference: Send + Sync {
    /// Template family this inference produces
    fn template_type(&self) -> TemplateType;

    /// Attempt the derivation; `None` when the observation does not fit
    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate>;
}

// ============================================================================
// URL Generalization Helpers
// ============================================================================

/// Escape a host for embedding in a regular expression, admitting an
/// optional `www.` prefix
fn host_pattern(host: &str) -> String {
    let bare = host.strip_prefix("www.").unwrap_or(host);
    format!(r"(www\.)?{}", regex::escape(bare))
}

/// Generalize one path segment: identifier-looking segments become
/// wildcards, short static words stay literal
fn generalize_segment(segment: &str) -> String {
    let looks_static = !segment.is_empty()
        && segment.len() <= 12
        && segment.chars().all(|c| c.is_ascii_lowercase() || c == '-')
        && !segment.chars().any(|c| c.is_ascii_digit());
    if looks_static {
        regex::escape(segment)
    } else {
        "[^/]+".to_string()
    }
}

/// Build a URL regular expression from a parsed URL, generalizing
/// identifier-like path segments
fn generalize_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(generalize_segment)
        .collect();

    let path = if segments.is_empty() {
        "/?".to_string()
    } else {
        format!("/{}/?", segments.join("/"))
    };

    Some(format!(
        r"^https?://{}{}{}(\?.*)?$",
        host_pattern(host),
        regex::escape(&port),
        path
    ))
}

/// The canonical whole-path extractor used by suffix-style templates
fn path_extractor() -> VarExtractor {
    VarExtractor {
        name: "path".to_string(),
        source: ExtractorSource::Path,
        regex: "^(.*?)/?$".to_string(),
        group: 1,
        transform: None,
    }
}

// ============================================================================
// Built-in Inferences
// ============================================================================

/// `page.json` style: the API document lives at the page URL plus `.json`
pub struct JsonSuffixInference;

impl TemplateInference for JsonSuffixInference {
    fn template_type(&self) -> TemplateType {
        TemplateType::JsonSuffix
    }

    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate> {
        let page = Url::parse(&observation.page_url).ok()?;
        let api = Url::parse(&observation.api_url).ok()?;
        if page.host_str() != api.host_str() {
            return None;
        }

        let page_path = page.path().trim_end_matches('/');
        let api_path = api.path();
        if api_path != format!("{}.json", page_path) {
            return None;
        }

        let origin = page.origin().ascii_serialization();
        Some(InferredTemplate {
            template_type: TemplateType::JsonSuffix,
            url_patterns: vec![generalize_url(&page)?],
            endpoint_template: format!("{}{{path}}.json", origin),
            extractors: vec![path_extractor()],
            response_format: ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: "title".to_string(),
                description: None,
                body: Some("body".to_string()),
                metadata: None,
            },
        })
    }
}

/// Package-registry style: an off-host lookup keyed by the last path segment
pub struct RegistryLookupInference;

impl TemplateInference for RegistryLookupInference {
    fn template_type(&self) -> TemplateType {
        TemplateType::RegistryLookup
    }

    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate> {
        let page = Url::parse(&observation.page_url).ok()?;
        let api = Url::parse(&observation.api_url).ok()?;
        if page.host_str() == api.host_str() {
            return None;
        }

        let name = page.path_segments()?.filter(|s| !s.is_empty()).last()?;
        let api_last = api.path_segments()?.filter(|s| !s.is_empty()).last()?;
        if name != api_last || name.is_empty() {
            return None;
        }

        let endpoint_template = {
            let trimmed = api.as_str().trim_end_matches('/');
            if !trimmed.ends_with(name) {
                return None;
            }
            format!("{}{{name}}", &trimmed[..trimmed.len() - name.len()])
        };

        let mut page_pattern = generalize_url(&page)?;
        // The name segment must stay a wildcard even when it looks static
        if let Some(idx) = page_pattern.rfind(&regex::escape(name)) {
            page_pattern.replace_range(idx..idx + regex::escape(name).len(), "[^/]+");
        }

        Some(InferredTemplate {
            template_type: TemplateType::RegistryLookup,
            url_patterns: vec![page_pattern],
            endpoint_template,
            extractors: vec![VarExtractor {
                name: "name".to_string(),
                source: ExtractorSource::Path,
                regex: "/([^/]+)/?$".to_string(),
                group: 1,
                transform: Some(VarTransform::UrlEncode),
            }],
            response_format: ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: "name".to_string(),
                description: Some("description".to_string()),
                body: None,
                metadata: None,
            },
        })
    }
}

/// REST style: page and API share a numeric resource identifier
pub struct RestResourceInference;

impl TemplateInference for RestResourceInference {
    fn template_type(&self) -> TemplateType {
        TemplateType::RestResource
    }

    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate> {
        let page = Url::parse(&observation.page_url).ok()?;
        let api = Url::parse(&observation.api_url).ok()?;

        let id = page
            .path_segments()?
            .filter(|s| s.len() >= 2 && s.chars().all(|c| c.is_ascii_digit()))
            .find(|s| api.path().contains(*s))?
            .to_string();

        let endpoint_template = api
            .as_str()
            .replacen(&format!("/{}", id), "/{id}", 1);

        Some(InferredTemplate {
            template_type: TemplateType::RestResource,
            url_patterns: vec![generalize_url(&page)?],
            endpoint_template,
            extractors: vec![VarExtractor {
                name: "id".to_string(),
                source: ExtractorSource::Path,
                regex: r"/(\d{2,})".to_string(),
                group: 1,
                transform: None,
            }],
            response_format: ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: "title".to_string(),
                description: Some("description".to_string()),
                body: Some("body".to_string()),
                metadata: None,
            },
        })
    }
}

/// Firebase style: `*.firebaseio.com/....json` keyed by an identifier
pub struct FirebaseRestInference;

impl TemplateInference for FirebaseRestInference {
    fn template_type(&self) -> TemplateType {
        TemplateType::FirebaseRest
    }

    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate> {
        let page = Url::parse(&observation.page_url).ok()?;
        let api = Url::parse(&observation.api_url).ok()?;
        let api_host = api.host_str()?;
        if !api_host.ends_with(".firebaseio.com") || !api.path().ends_with(".json") {
            return None;
        }

        // Key the endpoint by an identifier shared between the two URLs
        let id = page
            .query_pairs()
            .find(|(_, v)| api.path().contains(&**v))
            .map(|(_, v)| v.to_string())?;

        let endpoint_template = api.as_str().replacen(&id, "{id}", 1);

        Some(InferredTemplate {
            template_type: TemplateType::FirebaseRest,
            url_patterns: vec![generalize_url(&page)?],
            endpoint_template,
            extractors: vec![VarExtractor {
                name: "id".to_string(),
                source: ExtractorSource::Query,
                regex: r"id=(\d+)".to_string(),
                group: 1,
                transform: None,
            }],
            response_format: ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: "title".to_string(),
                description: None,
                body: Some("text".to_string()),
                metadata: None,
            },
        })
    }
}

/// Query-API style: a page path segment reappears as a query parameter value
pub struct QueryApiInference;

impl TemplateInference for QueryApiInference {
    fn template_type(&self) -> TemplateType {
        TemplateType::QueryApi
    }

    fn infer(&self, observation: &SuccessObservation) -> Option<InferredTemplate> {
        let page = Url::parse(&observation.page_url).ok()?;
        let api = Url::parse(&observation.api_url).ok()?;
        api.query()?;

        let segment = page
            .path_segments()?
            .filter(|s| !s.is_empty())
            .find(|s| {
                api.query_pairs()
                    .any(|(_, v)| v.as_ref() == *s)
            })?
            .to_string();

        let endpoint_template = api.as_str().replacen(&segment, "{q}", 1);

        let mut page_pattern = generalize_url(&page)?;
        if let Some(idx) = page_pattern.rfind(&regex::escape(&segment)) {
            page_pattern.replace_range(idx..idx + regex::escape(&segment).len(), "[^/]+");
        }

        Some(InferredTemplate {
            template_type: TemplateType::QueryApi,
            url_patterns: vec![page_pattern],
            endpoint_template,
            extractors: vec![VarExtractor {
                name: "q".to_string(),
                source: ExtractorSource::Path,
                regex: "/([^/]+)/?$".to_string(),
                group: 1,
                transform: Some(VarTransform::UrlEncode),
            }],
            response_format: ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: "title".to_string(),
                description: None,
                body: Some("extract".to_string()),
                metadata: None,
            },
        })
    }
}

/// The default inference set, one per template family, most specific first
pub fn builtin_inferences() -> Vec<Box<dyn TemplateInference>> {
    vec![
        Box::new(JsonSuffixInference),
        Box::new(FirebaseRestInference),
        Box::new(RegistryLookupInference),
        Box::new(QueryApiInference),
        Box::new(RestResourceInference),
    ]
}

// ============================================================================
// Variable Extraction
// ============================================================================

/// Pull one template variable out of a URL
pub trait VariableExtraction: Send + Sync {
    /// Extract the variable, or `None` when the URL does not carry it
    fn extract(&self, url: &Url, extractor: &VarExtractor) -> Option<String>;
}

/// Standard extractor: pick the source component, run the regex, take the
/// capture group, apply the optional transform
#[derive(Debug, Default)]
pub struct DefaultVariableExtractor;

impl VariableExtraction for DefaultVariableExtractor {
    fn extract(&self, url: &Url, extractor: &VarExtractor) -> Option<String> {
        let host = url.host_str().unwrap_or_default();
        let source = match extractor.source {
            ExtractorSource::Path => url.path().to_string(),
            ExtractorSource::Query => url.query().unwrap_or_default().to_string(),
            ExtractorSource::Hostname => host.to_string(),
            ExtractorSource::Subdomain => {
                let labels: Vec<&str> = host.split('.').collect();
                if labels.len() > 2 {
                    labels[..labels.len() - 2].join(".")
                } else {
                    String::new()
                }
            }
        };

        let regex = Regex::new(&extractor.regex).ok()?;
        let captures = regex.captures(&source)?;
        let raw = captures.get(extractor.group)?.as_str();

        Some(match extractor.transform {
            Some(VarTransform::Lowercase) => raw.to_lowercase(),
            Some(VarTransform::Uppercase) => raw.to_uppercase(),
            Some(VarTransform::UrlEncode) => {
                url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
            }
            None => raw.to_string(),
        })
    }
}

// ============================================================================
// Content Mapping
// ============================================================================

/// Canonical content assembled from an API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedContent {
    pub title: String,
    pub description: Option<String>,
    pub body: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl MappedContent {
    /// Combined length of the mapped textual fields
    pub fn content_length(&self) -> usize {
        self.title.len()
            + self.description.as_deref().map_or(0, str::len)
            + self.body.as_deref().map_or(0, str::len)
    }
}

/// Map a parsed response body onto canonical content
pub trait ContentMapper: Send + Sync {
    /// Apply the mapping; required fields that fail to resolve are errors
    fn map(
        &self,
        format: ResponseFormat,
        body: &str,
        mapping: &ContentMapping,
    ) -> Result<MappedContent, InferenceError>;
}

/// Standard mapper.
///
/// JSON paths are dot-separated with numeric segments indexing arrays. HTML
/// paths are CSS selectors. XML paths are bare tag names resolved with a
/// non-validating scan.
#[derive(Debug, Default)]
pub struct DefaultContentMapper;

impl DefaultContentMapper {
    fn resolve_json<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
        let mut current = root;
        for segment in path.split('.') {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    items.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    fn json_to_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn map_json(body: &str, mapping: &ContentMapping) -> Result<MappedContent, InferenceError> {
        let root: serde_json::Value =
            serde_json::from_str(body).map_err(|e| InferenceError::Parse {
                message: e.to_string(),
            })?;

        let title = Self::resolve_json(&root, &mapping.title)
            .map(Self::json_to_text)
            .ok_or_else(|| InferenceError::MissingField {
                path: mapping.title.clone(),
            })?;

        let description = mapping
            .description
            .as_deref()
            .and_then(|path| Self::resolve_json(&root, path))
            .map(Self::json_to_text);

        let body_text = mapping
            .body
            .as_deref()
            .and_then(|path| Self::resolve_json(&root, path))
            .map(Self::json_to_text);

        let mut metadata = BTreeMap::new();
        if let Some(mapped) = &mapping.metadata {
            for (key, path) in mapped {
                if let Some(value) = Self::resolve_json(&root, path) {
                    metadata.insert(key.clone(), Self::json_to_text(value));
                }
            }
        }

        Ok(MappedContent {
            title,
            description,
            body: body_text,
            metadata,
        })
    }

    fn extract_tag(body: &str, tag: &str) -> Option<String> {
        let open = format!("<{}", tag);
        let close = format!("</{}>", tag);
        let start = body.find(&open)?;
        let content_start = body[start..].find('>')? + start + 1;
        let end = body[content_start..].find(&close)? + content_start;
        Some(body[content_start..end].trim().to_string())
    }

    fn map_xml(body: &str, mapping: &ContentMapping) -> Result<MappedContent, InferenceError> {
        let title = Self::extract_tag(body, &mapping.title).ok_or_else(|| {
            InferenceError::MissingField {
                path: mapping.title.clone(),
            }
        })?;

        Ok(MappedContent {
            title,
            description: mapping
                .description
                .as_deref()
                .and_then(|tag| Self::extract_tag(body, tag)),
            body: mapping
                .body
                .as_deref()
                .and_then(|tag| Self::extract_tag(body, tag)),
            metadata: BTreeMap::new(),
        })
    }

    fn select_text(document: &scraper::Html, selector: &str) -> Option<String> {
        let parsed = scraper::Selector::parse(selector).ok()?;
        let element = document.select(&parsed).next()?;
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let trimmed = text.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    fn map_html(body: &str, mapping: &ContentMapping) -> Result<MappedContent, InferenceError> {
        let document = scraper::Html::parse_document(body);

        let title = Self::select_text(&document, &mapping.title).ok_or_else(|| {
            InferenceError::MissingField {
                path: mapping.title.clone(),
            }
        })?;

        Ok(MappedContent {
            title,
            description: mapping
                .description
                .as_deref()
                .and_then(|sel| Self::select_text(&document, sel)),
            body: mapping
                .body
                .as_deref()
                .and_then(|sel| Self::select_text(&document, sel)),
            metadata: BTreeMap::new(),
        })
    }
}

impl ContentMapper for DefaultContentMapper {
    fn map(
        &self,
        format: ResponseFormat,
        body: &str,
        mapping: &ContentMapping,
    ) -> Result<MappedContent, InferenceError> {
        match format {
            ResponseFormat::Json => Self::map_json(body, mapping),
            ResponseFormat::Xml => Self::map_xml(body, mapping),
            ResponseFormat::Html => Self::map_html(body, mapping),
        }
    }
}

// ============================================================================
// Bootstrap Seeds
// ============================================================================

fn seed(
    template_type: TemplateType,
    url_pattern: &str,
    endpoint_template: &str,
    extractors: Vec<VarExtractor>,
    response_format: ResponseFormat,
    content_mapping: ContentMapping,
) -> ApiPattern {
    let now = Timestamp::now();
    ApiPattern {
        id: PatternId::new(),
        template_type,
        url_patterns: vec![url_pattern.to_string()],
        endpoint_template: endpoint_template.to_string(),
        extractors,
        method: "GET".to_string(),
        headers: None,
        response_format,
        content_mapping,
        validation: PatternValidation {
            min_content_length: 10,
            ..Default::default()
        },
        metrics: PatternMetrics::starting_at(0.5),
        fallback_patterns: Vec::new(),
        created_at: now,
        updated_at: now,
        last_used_at: None,
        archived: false,
        below_threshold_since: None,
        last_decay_at: None,
    }
}

/// Built-in seed patterns loaded when no persisted registry exists.
///
/// One seed per template family; well-known public sites whose API shapes
/// are stable enough to ship.
pub fn bootstrap_patterns() -> Vec<ApiPattern> {
    vec![
        seed(
            TemplateType::JsonSuffix,
            r"^https?://(www\.)?reddit\.com/r/[^/]+/comments/[^/]+(/[^/]*)*/?$",
            "https://www.reddit.com{path}.json",
            vec![path_extractor()],
            ResponseFormat::Json,
            ContentMapping {
                title: "0.data.children.0.data.title".to_string(),
                description: None,
                body: Some("0.data.children.0.data.selftext".to_string()),
                metadata: None,
            },
        ),
        seed(
            TemplateType::RegistryLookup,
            r"^https?://(www\.)?npmjs\.com/package/[^/]+/?$",
            "https://registry.npmjs.org/{name}",
            vec![VarExtractor {
                name: "name".to_string(),
                source: ExtractorSource::Path,
                regex: "/package/([^/]+)".to_string(),
                group: 1,
                transform: Some(VarTransform::UrlEncode),
            }],
            ResponseFormat::Json,
            ContentMapping {
                title: "name".to_string(),
                description: Some("description".to_string()),
                body: Some("readme".to_string()),
                metadata: None,
            },
        ),
        seed(
            TemplateType::RestResource,
            r"^https?://(www\.)?github\.com/[^/]+/[^/]+/?$",
            "https://api.github.com/repos/{owner}/{repo}",
            vec![
                VarExtractor {
                    name: "owner".to_string(),
                    source: ExtractorSource::Path,
                    regex: "^/([^/]+)/".to_string(),
                    group: 1,
                    transform: None,
                },
                VarExtractor {
                    name: "repo".to_string(),
                    source: ExtractorSource::Path,
                    regex: "^/[^/]+/([^/]+)".to_string(),
                    group: 1,
                    transform: None,
                },
            ],
            ResponseFormat::Json,
            ContentMapping {
                title: "full_name".to_string(),
                description: Some("description".to_string()),
                body: None,
                metadata: None,
            },
        ),
        seed(
            TemplateType::FirebaseRest,
            r"^https?://news\.ycombinator\.com/item\?id=\d+$",
            "https://hacker-news.firebaseio.com/v0/item/{id}.json",
            vec![VarExtractor {
                name: "id".to_string(),
                source: ExtractorSource::Query,
                regex: r"id=(\d+)".to_string(),
                group: 1,
                transform: None,
            }],
            ResponseFormat::Json,
            ContentMapping {
                title: "title".to_string(),
                description: None,
                body: Some("text".to_string()),
                metadata: None,
            },
        ),
        seed(
            TemplateType::QueryApi,
            r"^https?://en\.wikipedia\.org/wiki/[^/]+$",
            "https://en.wikipedia.org/api/rest_v1/page/summary/{q}",
            vec![VarExtractor {
                name: "q".to_string(),
                source: ExtractorSource::Path,
                regex: "/wiki/([^/]+)".to_string(),
                group: 1,
                transform: None,
            }],
            ResponseFormat::Json,
            ContentMapping {
                title: "title".to_string(),
                description: Some("description".to_string()),
                body: Some("extract".to_string()),
                metadata: None,
            },
        ),
    ]
}

#[cfg(test)]
#[path = "inference_tests.rs"]
mod tests;
