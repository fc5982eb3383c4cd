//! Tests for template inference, extraction, and content mapping

use super::*;
use crate::patterns::ContentMapping;

fn observation(page: &str, api: &str) -> SuccessObservation {
    SuccessObservation {
        page_url: page.to_string(),
        api_url: api.to_string(),
        content_type: Some("application/json".to_string()),
        domain: Url::parse(page)
            .unwrap()
            .host_str()
            .unwrap()
            .to_string(),
    }
}

// ============================================================================
// Template Inference Tests
// ============================================================================

#[test]
fn test_json_suffix_inference() {
    let obs = observation(
        "https://reddit.com/r/rust/comments/abc123/some_title/",
        "https://reddit.com/r/rust/comments/abc123/some_title.json",
    );
    let template = JsonSuffixInference.infer(&obs).expect("should infer");

    assert_eq!(template.template_type, TemplateType::JsonSuffix);
    assert!(template.endpoint_template.ends_with("{path}.json"));
    assert_eq!(template.extractors.len(), 1);
    assert_eq!(template.extractors[0].name, "path");

    // The generalized pattern matches sibling URLs
    let regex = Regex::new(&template.url_patterns[0]).unwrap();
    assert!(regex.is_match("https://reddit.com/r/rust/comments/xyz789/other_title/"));
}

#[test]
fn test_json_suffix_rejects_cross_host() {
    let obs = observation(
        "https://reddit.com/r/rust/comments/abc/t/",
        "https://api.reddit.com/r/rust/comments/abc/t.json",
    );
    assert!(JsonSuffixInference.infer(&obs).is_none());
}

#[test]
fn test_registry_lookup_inference() {
    let obs = observation(
        "https://npmjs.com/package/express",
        "https://registry.npmjs.org/express",
    );
    let template = RegistryLookupInference.infer(&obs).expect("should infer");

    assert_eq!(template.template_type, TemplateType::RegistryLookup);
    assert_eq!(
        template.endpoint_template,
        "https://registry.npmjs.org/{name}"
    );

    let regex = Regex::new(&template.url_patterns[0]).unwrap();
    assert!(regex.is_match("https://npmjs.com/package/left-pad"));
}

#[test]
fn test_registry_lookup_requires_cross_host() {
    let obs = observation(
        "https://npmjs.com/package/express",
        "https://npmjs.com/api/express",
    );
    assert!(RegistryLookupInference.infer(&obs).is_none());
}

#[test]
fn test_rest_resource_inference() {
    let obs = observation(
        "https://store.example.com/products/12345/reviews",
        "https://api.example.com/v2/products/12345",
    );
    let template = RestResourceInference.infer(&obs).expect("should infer");

    assert_eq!(template.template_type, TemplateType::RestResource);
    assert_eq!(
        template.endpoint_template,
        "https://api.example.com/v2/products/{id}"
    );
}

#[test]
fn test_rest_resource_needs_shared_numeric_id() {
    let obs = observation(
        "https://store.example.com/products/shoes",
        "https://api.example.com/v2/products/12345",
    );
    assert!(RestResourceInference.infer(&obs).is_none());
}

#[test]
fn test_firebase_inference() {
    let obs = observation(
        "https://news.ycombinator.com/item?id=39001234",
        "https://hacker-news.firebaseio.com/v0/item/39001234.json",
    );
    let template = FirebaseRestInference.infer(&obs).expect("should infer");

    assert_eq!(template.template_type, TemplateType::FirebaseRest);
    assert_eq!(
        template.endpoint_template,
        "https://hacker-news.firebaseio.com/v0/item/{id}.json"
    );
}

#[test]
fn test_query_api_inference() {
    let obs = observation(
        "https://en.wikipedia.org/wiki/Rust_(programming_language)",
        "https://en.wikipedia.org/w/api.php?action=query&titles=Rust_(programming_language)",
    );
    let template = QueryApiInference.infer(&obs).expect("should infer");

    assert_eq!(template.template_type, TemplateType::QueryApi);
    assert!(template.endpoint_template.contains("{q}"));
}

#[test]
fn test_builtin_inferences_cover_all_types() {
    let inferences = builtin_inferences();
    let mut types: Vec<_> = inferences.iter().map(|i| i.template_type()).collect();
    types.sort();
    types.dedup();
    assert_eq!(types.len(), TemplateType::ALL.len());
}

// ============================================================================
// Variable Extraction Tests
// ============================================================================

#[test]
fn test_extract_from_path() {
    let url = Url::parse("https://npmjs.com/package/express").unwrap();
    let extractor = VarExtractor {
        name: "name".to_string(),
        source: ExtractorSource::Path,
        regex: "/package/([^/]+)".to_string(),
        group: 1,
        transform: None,
    };
    assert_eq!(
        DefaultVariableExtractor.extract(&url, &extractor),
        Some("express".to_string())
    );
}

#[test]
fn test_extract_from_query() {
    let url = Url::parse("https://news.ycombinator.com/item?id=123456").unwrap();
    let extractor = VarExtractor {
        name: "id".to_string(),
        source: ExtractorSource::Query,
        regex: r"id=(\d+)".to_string(),
        group: 1,
        transform: None,
    };
    assert_eq!(
        DefaultVariableExtractor.extract(&url, &extractor),
        Some("123456".to_string())
    );
}

#[test]
fn test_extract_from_subdomain_and_hostname() {
    let url = Url::parse("https://api.eu.example.com/x").unwrap();

    let sub = VarExtractor {
        name: "region".to_string(),
        source: ExtractorSource::Subdomain,
        regex: r"\.([a-z]+)$".to_string(),
        group: 1,
        transform: None,
    };
    assert_eq!(
        DefaultVariableExtractor.extract(&url, &sub),
        Some("eu".to_string())
    );

    let host = VarExtractor {
        name: "host".to_string(),
        source: ExtractorSource::Hostname,
        regex: "^(.*)$".to_string(),
        group: 1,
        transform: None,
    };
    assert_eq!(
        DefaultVariableExtractor.extract(&url, &host),
        Some("api.eu.example.com".to_string())
    );
}

#[test]
fn test_extract_transforms() {
    let url = Url::parse("https://example.com/items/Hello%20World").unwrap();
    let lower = VarExtractor {
        name: "x".to_string(),
        source: ExtractorSource::Path,
        regex: "/items/([^/]+)".to_string(),
        group: 1,
        transform: Some(VarTransform::Lowercase),
    };
    assert_eq!(
        DefaultVariableExtractor.extract(&url, &lower),
        Some("hello%20world".to_string())
    );
}

#[test]
fn test_extract_missing_returns_none() {
    let url = Url::parse("https://example.com/other").unwrap();
    let extractor = VarExtractor {
        name: "name".to_string(),
        source: ExtractorSource::Path,
        regex: "/package/([^/]+)".to_string(),
        group: 1,
        transform: None,
    };
    assert_eq!(DefaultVariableExtractor.extract(&url, &extractor), None);
}

// ============================================================================
// Content Mapping Tests
// ============================================================================

#[test]
fn test_map_json_with_nested_paths() {
    let body = r#"[{"data": {"children": [{"data": {"title": "Hello", "selftext": "World"}}]}}]"#;
    let mapping = ContentMapping {
        title: "0.data.children.0.data.title".to_string(),
        description: None,
        body: Some("0.data.children.0.data.selftext".to_string()),
        metadata: None,
    };

    let mapped = DefaultContentMapper
        .map(ResponseFormat::Json, body, &mapping)
        .unwrap();
    assert_eq!(mapped.title, "Hello");
    assert_eq!(mapped.body.as_deref(), Some("World"));
}

#[test]
fn test_map_json_missing_title_errors() {
    let body = r#"{"name": "x"}"#;
    let mapping = ContentMapping {
        title: "title".to_string(),
        description: None,
        body: None,
        metadata: None,
    };
    assert!(matches!(
        DefaultContentMapper.map(ResponseFormat::Json, body, &mapping),
        Err(InferenceError::MissingField { .. })
    ));
}

#[test]
fn test_map_json_parse_error() {
    let mapping = ContentMapping {
        title: "title".to_string(),
        description: None,
        body: None,
        metadata: None,
    };
    assert!(matches!(
        DefaultContentMapper.map(ResponseFormat::Json, "not json", &mapping),
        Err(InferenceError::Parse { .. })
    ));
}

#[test]
fn test_map_json_metadata() {
    let body = r#"{"name": "pkg", "version": "2.0.1", "license": "MIT"}"#;
    let mut meta = std::collections::BTreeMap::new();
    meta.insert("version".to_string(), "version".to_string());
    meta.insert("license".to_string(), "license".to_string());
    let mapping = ContentMapping {
        title: "name".to_string(),
        description: None,
        body: None,
        metadata: Some(meta),
    };

    let mapped = DefaultContentMapper
        .map(ResponseFormat::Json, body, &mapping)
        .unwrap();
    assert_eq!(mapped.metadata["version"], "2.0.1");
    assert_eq!(mapped.metadata["license"], "MIT");
}

#[test]
fn test_map_html_with_selectors() {
    let body = "<html><head><title>Page Title</title></head>\
                <body><p class=\"lead\">Intro text</p></body></html>";
    let mapping = ContentMapping {
        title: "title".to_string(),
        description: Some("p.lead".to_string()),
        body: None,
        metadata: None,
    };

    let mapped = DefaultContentMapper
        .map(ResponseFormat::Html, body, &mapping)
        .unwrap();
    assert_eq!(mapped.title, "Page Title");
    assert_eq!(mapped.description.as_deref(), Some("Intro text"));
}

#[test]
fn test_map_xml_tags() {
    let body = "<item><title>Feed Item</title><summary>Short text</summary></item>";
    let mapping = ContentMapping {
        title: "title".to_string(),
        description: Some("summary".to_string()),
        body: None,
        metadata: None,
    };

    let mapped = DefaultContentMapper
        .map(ResponseFormat::Xml, body, &mapping)
        .unwrap();
    assert_eq!(mapped.title, "Feed Item");
    assert_eq!(mapped.description.as_deref(), Some("Short text"));
}

#[test]
fn test_mapped_content_length() {
    let mapped = MappedContent {
        title: "12345".to_string(),
        description: Some("123".to_string()),
        body: Some("12".to_string()),
        metadata: std::collections::BTreeMap::new(),
    };
    assert_eq!(mapped.content_length(), 10);
}

// ============================================================================
// Bootstrap Seed Tests
// ============================================================================

#[test]
fn test_bootstrap_patterns_compile_and_cover_types() {
    let seeds = bootstrap_patterns();
    assert_eq!(seeds.len(), 5);

    let mut types: Vec<_> = seeds.iter().map(|p| p.template_type).collect();
    types.sort();
    types.dedup();
    assert_eq!(types.len(), 5);

    for pattern in &seeds {
        for raw in &pattern.url_patterns {
            assert!(Regex::new(raw).is_ok(), "seed regex must compile: {}", raw);
        }
        assert!((pattern.metrics.confidence - 0.5).abs() < 1e-9);
    }
}

#[test]
fn test_reddit_seed_matches_comment_urls() {
    let seeds = bootstrap_patterns();
    let reddit = seeds
        .iter()
        .find(|p| p.template_type == TemplateType::JsonSuffix)
        .unwrap();
    let regex = Regex::new(&reddit.url_patterns[0]).unwrap();

    assert!(regex.is_match("https://reddit.com/r/foo/comments/abc123/title/"));
    assert!(regex.is_match("https://www.reddit.com/r/foo/comments/xyz789/other/"));
    assert!(!regex.is_match("https://reddit.com/r/foo/"));
}

#[test]
fn test_github_seed_extracts_both_vars() {
    let seeds = bootstrap_patterns();
    let github = seeds
        .iter()
        .find(|p| p.template_type == TemplateType::RestResource)
        .unwrap();

    let url = Url::parse("https://github.com/rust-lang/cargo").unwrap();
    let extractor = DefaultVariableExtractor;
    let owner = extractor.extract(&url, &github.extractors[0]).unwrap();
    let repo = extractor.extract(&url, &github.extractors[1]).unwrap();
    assert_eq!(owner, "rust-lang");
    assert_eq!(repo, "cargo");
}
