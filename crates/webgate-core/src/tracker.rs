//! # Content-Change Tracker
//!
//! Persists URL fingerprints and reports semantic deltas across fetches.
//!
//! A fingerprint is the SHA-256 of the normalized text plus coarse shape
//! numbers; section hashes allow the diff to name what moved. State lives
//! in one schema-versioned JSON file replaced atomically on every
//! mutation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::scheduler::normalize_domain;
use crate::Timestamp;

/// Current schema version written to `content-changes.json`
pub const TRACKER_SCHEMA_VERSION: &str = "1.0";

/// Global bound on retained change records
pub const GLOBAL_HISTORY_CAP: usize = 1000;

/// Per-URL bound on retained change records
pub const PER_URL_HISTORY_CAP: usize = 50;

// ============================================================================
// Errors
// ============================================================================

/// Error type for tracker operations
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker state I/O failed: {message}")]
    Io { message: String },

    #[error("tracker state does not deserialize: {message}")]
    Serialization { message: String },

    #[error("unsupported tracker schema version '{found}'")]
    UnsupportedVersion { found: String },

    #[error("URL '{url}' is not tracked")]
    NotTracked { url: String },

    #[error("URL does not parse: {message}")]
    InvalidUrl { message: String },
}

// ============================================================================
// Fingerprints and Records
// ============================================================================

/// Stable fingerprint of one page's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    /// SHA-256 of the normalized text, hex
    pub hash: String,

    pub text_length: usize,
    pub word_count: usize,

    /// Hashes of blank-line-separated sections, in document order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_hashes: Option<Vec<String>>,
}

impl ContentFingerprint {
    /// Fingerprint a page's text
    pub fn of(text: &str) -> Self {
        let normalized = normalize_text(text);
        let sections: Vec<String> = split_sections(text)
            .iter()
            .map(|section| short_hash(section))
            .collect();

        Self {
            hash: hex::encode(Sha256::digest(normalized.as_bytes())),
            text_length: normalized.len(),
            word_count: normalized.split_whitespace().count(),
            section_hashes: (!sections.is_empty()).then_some(sections),
        }
    }
}

/// How consequential a detected change is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSignificance {
    Low,
    Medium,
    High,
}

/// One recorded change of one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub url: String,
    pub detected_at: Timestamp,
    pub significance: ChangeSignificance,
    pub word_count_delta: i64,
    pub added_sections: usize,
    pub removed_sections: usize,
}

/// Outcome of checking a tracked URL against fresh content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub changed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<ChangeSignificance>,

    pub word_count_delta: i64,
    pub added_sections: usize,
    pub removed_sections: usize,
}

impl ChangeReport {
    fn unchanged() -> Self {
        Self {
            changed: false,
            significance: None,
            word_count_delta: 0,
            added_sections: 0,
            removed_sections: 0,
        }
    }
}

/// One tracked URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedUrl {
    pub url: String,
    pub domain: String,
    pub fingerprint: ContentFingerprint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub check_count: u64,
    pub change_count: u64,
    pub first_seen: Timestamp,
    pub last_checked: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<Timestamp>,

    #[serde(default)]
    pub history: VecDeque<ChangeRecord>,
}

/// Filters for listing tracked URLs
#[derive(Debug, Clone, Default)]
pub struct TrackedUrlFilter {
    pub domain: Option<String>,
    pub tag: Option<String>,
    pub has_changed: Option<bool>,
    pub limit: Option<usize>,
}

// ============================================================================
// Persistence Shape
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTracker {
    schema_version: String,
    saved_at: Timestamp,
    urls: Vec<TrackedUrl>,
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Debug, Default)]
struct TrackerState {
    urls: HashMap<String, TrackedUrl>,
    global_history: VecDeque<ChangeRecord>,
}

/// Thread-safe content-change tracker
#[derive(Debug)]
pub struct ContentTracker {
    path: PathBuf,
    state: Mutex<TrackerState>,
}

impl ContentTracker {
    /// Create a tracker persisting to `path`, loading existing state
    pub async fn open(path: PathBuf) -> Result<Self, TrackerError> {
        let tracker = Self {
            path,
            state: Mutex::new(TrackerState::default()),
        };
        tracker.load().await?;
        Ok(tracker)
    }

    /// Begin (or reset) tracking a URL
    #[instrument(skip(self, text))]
    pub async fn track(
        &self,
        url: &str,
        text: &str,
        label: Option<String>,
        tags: Vec<String>,
    ) -> Result<TrackedUrl, TrackerError> {
        let parsed = url::Url::parse(url).map_err(|e| TrackerError::InvalidUrl {
            message: e.to_string(),
        })?;
        let domain = parsed
            .host_str()
            .map(normalize_domain)
            .unwrap_or_default();

        let now = Timestamp::now();
        let record = TrackedUrl {
            url: url.to_string(),
            domain,
            fingerprint: ContentFingerprint::of(text),
            label,
            tags,
            check_count: 1,
            change_count: 0,
            first_seen: now,
            last_checked: now,
            last_changed: None,
            history: VecDeque::new(),
        };

        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.urls.insert(url.to_string(), record.clone());
        }
        self.save().await?;
        Ok(record)
    }

    /// Check fresh content against the stored fingerprint
    #[instrument(skip(self, text))]
    pub async fn check(&self, url: &str, text: &str) -> Result<ChangeReport, TrackerError> {
        let fresh = ContentFingerprint::of(text);
        let now = Timestamp::now();

        let report = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let record = state
                .urls
                .get_mut(url)
                .ok_or_else(|| TrackerError::NotTracked {
                    url: url.to_string(),
                })?;

            record.check_count += 1;
            record.last_checked = now;

            if record.fingerprint.hash == fresh.hash {
                ChangeReport::unchanged()
            } else {
                let report = diff(&record.fingerprint, &fresh);
                let change = ChangeRecord {
                    url: url.to_string(),
                    detected_at: now,
                    significance: report
                        .significance
                        .unwrap_or(ChangeSignificance::Low),
                    word_count_delta: report.word_count_delta,
                    added_sections: report.added_sections,
                    removed_sections: report.removed_sections,
                };

                record.change_count += 1;
                record.last_changed = Some(now);
                record.fingerprint = fresh;
                record.history.push_back(change.clone());
                while record.history.len() > PER_URL_HISTORY_CAP {
                    record.history.pop_front();
                }

                state.global_history.push_back(change);
                while state.global_history.len() > GLOBAL_HISTORY_CAP {
                    state.global_history.pop_front();
                }

                report
            }
        };

        self.save().await?;
        Ok(report)
    }

    /// Whether a URL is currently tracked
    pub fn is_tracked(&self, url: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.urls.contains_key(url)
    }

    /// Snapshot one tracked URL
    pub fn get(&self, url: &str) -> Option<TrackedUrl> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.urls.get(url).cloned()
    }

    /// Stop tracking a URL
    pub async fn untrack(&self, url: &str) -> Result<(), TrackerError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state
                .urls
                .remove(url)
                .ok_or_else(|| TrackerError::NotTracked {
                    url: url.to_string(),
                })?;
        }
        self.save().await
    }

    /// List tracked URLs with filters
    pub fn list(&self, filter: &TrackedUrlFilter) -> Vec<TrackedUrl> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut records: Vec<TrackedUrl> = state
            .urls
            .values()
            .filter(|record| {
                if let Some(domain) = &filter.domain {
                    if record.domain != normalize_domain(domain) {
                        return false;
                    }
                }
                if let Some(tag) = &filter.tag {
                    if !record.tags.iter().any(|t| t == tag) {
                        return false;
                    }
                }
                if let Some(has_changed) = filter.has_changed {
                    if (record.change_count > 0) != has_changed {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        records.sort_by(|a, b| b.last_checked.cmp(&a.last_checked));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        records
    }

    /// Most recent change records across all URLs, newest first
    pub fn recent_changes(&self, limit: usize) -> Vec<ChangeRecord> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .global_history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn load(&self) -> Result<(), TrackerError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(TrackerError::Io {
                    message: format!("failed to read tracker state: {}", e),
                })
            }
        };

        let persisted: PersistedTracker =
            serde_json::from_str(&raw).map_err(|e| TrackerError::Serialization {
                message: e.to_string(),
            })?;

        let major = persisted
            .schema_version
            .split('.')
            .next()
            .unwrap_or_default();
        if major != TRACKER_SCHEMA_VERSION.split('.').next().unwrap_or_default() {
            return Err(TrackerError::UnsupportedVersion {
                found: persisted.schema_version,
            });
        }

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut history: Vec<ChangeRecord> = persisted
            .urls
            .iter()
            .flat_map(|record| record.history.iter().cloned())
            .collect();
        history.sort_by_key(|record| record.detected_at);
        state.global_history = history
            .into_iter()
            .rev()
            .take(GLOBAL_HISTORY_CAP)
            .rev()
            .collect();
        state.urls = persisted
            .urls
            .into_iter()
            .map(|record| (record.url.clone(), record))
            .collect();
        Ok(())
    }

    async fn save(&self) -> Result<(), TrackerError> {
        let snapshot = {
            let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let mut urls: Vec<TrackedUrl> = state.urls.values().cloned().collect();
            urls.sort_by(|a, b| a.url.cmp(&b.url));
            PersistedTracker {
                schema_version: TRACKER_SCHEMA_VERSION.to_string(),
                saved_at: Timestamp::now(),
                urls,
            }
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrackerError::Io {
                    message: format!("failed to create state directory: {}", e),
                })?;
        }

        let json =
            serde_json::to_string_pretty(&snapshot).map_err(|e| TrackerError::Serialization {
                message: e.to_string(),
            })?;

        let temp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| TrackerError::Io {
                message: format!("failed to create temp file: {}", e),
            })?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| TrackerError::Io {
                message: format!("failed to write tracker state: {}", e),
            })?;
        file.flush().await.map_err(|e| TrackerError::Io {
            message: format!("failed to flush tracker state: {}", e),
        })?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| TrackerError::Io {
                message: format!("failed to rename temp file: {}", e),
            })
    }
}

// ============================================================================
// Text Normalization and Diffing
// ============================================================================

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_sections(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(normalize_text)
        .filter(|section| !section.is_empty())
        .collect()
}

fn short_hash(section: &str) -> String {
    hex::encode(&Sha256::digest(section.as_bytes())[..8])
}

/// Semantic diff of two fingerprints
fn diff(old: &ContentFingerprint, fresh: &ContentFingerprint) -> ChangeReport {
    let old_sections: std::collections::HashSet<&String> = old
        .section_hashes
        .iter()
        .flatten()
        .collect();
    let new_sections: std::collections::HashSet<&String> = fresh
        .section_hashes
        .iter()
        .flatten()
        .collect();

    let added_sections = new_sections.difference(&old_sections).count();
    let removed_sections = old_sections.difference(&new_sections).count();
    let word_count_delta = fresh.word_count as i64 - old.word_count as i64;

    let relative = if old.word_count == 0 {
        1.0
    } else {
        word_count_delta.unsigned_abs() as f64 / old.word_count as f64
    };
    let section_churn = added_sections + removed_sections;

    let significance = if relative > 0.3 || section_churn > 5 {
        ChangeSignificance::High
    } else if relative > 0.1 || section_churn > 2 {
        ChangeSignificance::Medium
    } else {
        ChangeSignificance::Low
    };

    ChangeReport {
        changed: true,
        significance: Some(significance),
        word_count_delta,
        added_sections,
        removed_sections,
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
