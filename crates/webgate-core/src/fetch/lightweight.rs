//! # Lightweight Tier
//!
//! Plain HTTP fetch of a page followed by static extraction: title, text,
//! a markdown rendition, tables, links, and any JSON API endpoints the
//! markup advertises.
//!
//! No rendering happens here. Pages that need JavaScript fall through
//! verification and escalate to the rendered tier.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::{
    FetchContent, FetchOptions, Link, LightweightTier, Table, TierError, TierOutcome,
    TierResponse,
};
use crate::retry::RetryEngine;
use crate::{CancelToken, FailureCategory};

/// Block-level tags rendered as their own markdown paragraphs
const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Precompiled selectors for the static extraction pass
struct Selectors {
    title: Selector,
    body: Selector,
    paragraphs: Selector,
    tables: Selector,
    header_cells: Selector,
    rows: Selector,
    cells: Selector,
    links: Selector,
    api_links: Selector,
    scripts: Selector,
}

impl Selectors {
    fn new() -> Result<Self, TierError> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| {
                TierError::new(
                    FailureCategory::Unknown,
                    format!("selector '{}' does not parse: {}", s, e),
                )
            })
        };
        Ok(Self {
            title: parse("title")?,
            body: parse("body")?,
            paragraphs: parse("p, li, pre, blockquote")?,
            tables: parse("table")?,
            header_cells: parse("th")?,
            rows: parse("tr")?,
            cells: parse("td")?,
            links: parse("a[href]")?,
            api_links: parse("link[rel=alternate][type='application/json']")?,
            scripts: parse("script, style, nav, footer")?,
        })
    }
}

/// Lightweight tier backed by `reqwest` and `scraper`
pub struct HttpLightweightTier {
    client: reqwest::Client,
}

impl HttpLightweightTier {
    /// Create a tier with a default client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a tier with an injected client (proxy, custom TLS)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpLightweightTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LightweightTier for HttpLightweightTier {
    #[instrument(skip(self, _options, cancel))]
    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<TierOutcome, TierError> {
        let request = self.client.get(url).timeout(timeout);

        let response = tokio::select! {
            response = request.send() => response.map_err(|e| TierError {
                category: RetryEngine::classify_transport(&e),
                message: e.to_string(),
                status_code: None,
            })?,
            _ = cancel.cancelled() => {
                return Err(TierError::new(
                    FailureCategory::Timeout,
                    "fetch cancelled by caller",
                ));
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        if !(200..300).contains(&status) {
            return Err(TierError {
                category: FailureCategory::from_http_status(status),
                message: format!("page answered {}", status),
                status_code: Some(status),
            });
        }

        let body = response.text().await.map_err(|e| TierError {
            category: FailureCategory::NetworkError,
            message: format!("failed to read body: {}", e),
            status_code: Some(status),
        })?;

        let extracted = extract_static(&body, &final_url)?;

        Ok(TierOutcome {
            response: TierResponse {
                status,
                headers,
                body: body.clone(),
            },
            final_url,
            content: FetchContent {
                markdown: extracted.markdown,
                text: extracted.text,
                html: Some(body),
            },
            tables: (!extracted.tables.is_empty()).then_some(extracted.tables),
            links: (!extracted.links.is_empty()).then_some(extracted.links),
            discovered_apis: (!extracted.apis.is_empty()).then_some(extracted.apis),
            structured_data: None,
        })
    }
}

// ============================================================================
// Static Extraction
// ============================================================================

struct Extracted {
    markdown: String,
    text: String,
    tables: Vec<Table>,
    links: Vec<Link>,
    apis: Vec<String>,
}

fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Static extraction pass over raw HTML.
///
/// Parsing must happen in one synchronous scope: `scraper::Html` is not
/// `Send`, so nothing here may live across an await point.
fn extract_static(html: &str, final_url: &str) -> Result<Extracted, TierError> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);
    let base = Url::parse(final_url).ok();

    let title = document
        .select(&selectors.title)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();

    // Full-page text with script/style noise excluded
    let noise: std::collections::HashSet<_> = document
        .select(&selectors.scripts)
        .flat_map(|el| el.text())
        .collect();
    let text = document
        .select(&selectors.body)
        .next()
        .map(|body| {
            let pieces: Vec<&str> = body
                .text()
                .filter(|t| !t.trim().is_empty() && !noise.contains(t))
                .collect();
            normalize_whitespace(&pieces.join(" "))
        })
        .unwrap_or_default();

    // Markdown: title heading, then headings and paragraph blocks in order
    let mut markdown = String::new();
    if !title.is_empty() {
        markdown.push_str(&format!("# {}\n\n", title));
    }
    for tag in HEADING_TAGS {
        // Selector for a single heading level is always valid
        if let Ok(selector) = Selector::parse(tag) {
            for el in document.select(&selector) {
                let heading = normalize_whitespace(&el.text().collect::<String>());
                if !heading.is_empty() && heading != title {
                    let level = "#".repeat(tag[1..].parse::<usize>().unwrap_or(1));
                    markdown.push_str(&format!("{} {}\n\n", level, heading));
                }
            }
        }
    }
    for el in document.select(&selectors.paragraphs) {
        let block = normalize_whitespace(&el.text().collect::<String>());
        if !block.is_empty() {
            markdown.push_str(&block);
            markdown.push_str("\n\n");
        }
    }
    let markdown = markdown.trim_end().to_string();

    let tables = document
        .select(&selectors.tables)
        .map(|table| {
            let headers = table
                .select(&selectors.header_cells)
                .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                .collect();
            let rows = table
                .select(&selectors.rows)
                .map(|row| {
                    row.select(&selectors.cells)
                        .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                        .collect::<Vec<_>>()
                })
                .filter(|cells: &Vec<String>| !cells.is_empty())
                .collect();
            Table { headers, rows }
        })
        .collect();

    let links = document
        .select(&selectors.links)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let resolved = match &base {
                Some(base) => base.join(href).ok()?.to_string(),
                None => href.to_string(),
            };
            if !resolved.starts_with("http") {
                return None;
            }
            Some(Link {
                href: resolved,
                text: normalize_whitespace(&el.text().collect::<String>()),
            })
        })
        .collect();

    let apis = document
        .select(&selectors.api_links)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            match &base {
                Some(base) => base.join(href).ok().map(|u| u.to_string()),
                None => Some(href.to_string()),
            }
        })
        .collect();

    Ok(Extracted {
        markdown,
        text,
        tables,
        links,
        apis,
    })
}

#[cfg(test)]
#[path = "lightweight_tests.rs"]
mod tests;
