//! # Registry Persistence
//!
//! Schema-versioned JSON persistence for the pattern registry with a
//! debounced writer.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write never leaves a torn state file. Readers tolerate unknown
//! fields (forward compatibility within a major version) and reject unknown
//! major versions outright.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use super::{AntiPattern, ApiPattern};
use crate::Timestamp;

/// Current schema version written to `patterns.json`
pub const SCHEMA_VERSION: &str = "1.0";

// ============================================================================
// Errors
// ============================================================================

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file I/O failed: {message}")]
    Io { message: String },

    #[error("state file does not deserialize: {message}")]
    Serialization { message: String },

    #[error("unsupported state schema version '{found}' (supported major: {supported})")]
    UnsupportedVersion { found: String, supported: String },
}

// ============================================================================
// Persisted Shape
// ============================================================================

/// On-disk shape of the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRegistry {
    pub schema_version: String,
    pub saved_at: Timestamp,
    pub patterns: Vec<ApiPattern>,

    #[serde(default)]
    pub anti_patterns: Vec<AntiPattern>,
}

impl PersistedRegistry {
    /// Assemble a snapshot at the current schema version
    pub fn new(patterns: Vec<ApiPattern>, anti_patterns: Vec<AntiPattern>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            saved_at: Timestamp::now(),
            patterns,
            anti_patterns,
        }
    }
}

fn major_of(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

// ============================================================================
// File Operations
// ============================================================================

/// Atomically write a registry snapshot: temp file, flush, rename
pub async fn save_registry_file(
    path: &Path,
    snapshot: &PersistedRegistry,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("failed to create state directory: {}", e),
            })?;
    }

    let json =
        serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::Serialization {
            message: format!("failed to serialize registry: {}", e),
        })?;

    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| StoreError::Io {
            message: format!("failed to create temp file: {}", e),
        })?;

    file.write_all(json.as_bytes())
        .await
        .map_err(|e| StoreError::Io {
            message: format!("failed to write registry: {}", e),
        })?;

    file.flush().await.map_err(|e| StoreError::Io {
        message: format!("failed to flush registry: {}", e),
    })?;
    drop(file);

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| StoreError::Io {
            message: format!("failed to rename temp file: {}", e),
        })
}

/// Load a registry snapshot; `Ok(None)` when the file does not exist
pub async fn load_registry_file(path: &Path) -> Result<Option<PersistedRegistry>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                message: format!("failed to read state file: {}", e),
            })
        }
    };

    // Probe the version before deserializing the full shape so a major
    // mismatch produces the right error rather than a field soup.
    #[derive(Deserialize)]
    struct VersionProbe {
        schema_version: String,
    }
    let probe: VersionProbe =
        serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
            message: format!("state file has no readable schema_version: {}", e),
        })?;

    if major_of(&probe.schema_version) != major_of(SCHEMA_VERSION) {
        return Err(StoreError::UnsupportedVersion {
            found: probe.schema_version,
            supported: major_of(SCHEMA_VERSION).to_string(),
        });
    }

    let snapshot: PersistedRegistry =
        serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
            message: format!("state file does not deserialize: {}", e),
        })?;
    Ok(Some(snapshot))
}

// ============================================================================
// Debounced Writer
// ============================================================================

enum DebounceMsg {
    Dirty,
    Flush(oneshot::Sender<()>),
}

/// Coalesces bursts of mutations into one write per debounce window.
///
/// `flush` forces an immediate write and waits for it; shutdown paths call
/// it so no mutation is lost.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<DebounceMsg>,
}

impl Debouncer {
    /// Spawn the writer task. `writer` performs one persistence pass.
    pub fn spawn<F, Fut>(delay: Duration, mut writer: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceMsg>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    DebounceMsg::Flush(ack) => {
                        writer().await;
                        let _ = ack.send(());
                    }
                    DebounceMsg::Dirty => {
                        let mut flush_ack = None;
                        let deadline = tokio::time::sleep(delay);
                        tokio::pin!(deadline);

                        // Absorb further dirt until the window closes or a
                        // flush demands immediacy
                        loop {
                            tokio::select! {
                                _ = &mut deadline => break,
                                next = rx.recv() => match next {
                                    Some(DebounceMsg::Dirty) => {}
                                    Some(DebounceMsg::Flush(ack)) => {
                                        flush_ack = Some(ack);
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }

                        writer().await;
                        if let Some(ack) = flush_ack {
                            let _ = ack.send(());
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Signal that state changed; a write follows within the debounce window
    pub fn mark_dirty(&self) {
        if self.tx.send(DebounceMsg::Dirty).is_err() {
            warn!("persistence writer task is gone; state change not scheduled");
        }
    }

    /// Force a write now and wait for it to land
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(DebounceMsg::Flush(ack_tx)).is_ok() {
            if ack_rx.await.is_err() {
                error!("persistence writer task died during flush");
            }
        }
    }
}

/// Convenience: the default registry path inside a state directory
pub fn registry_path(state_dir: &Path) -> PathBuf {
    state_dir.join("patterns.json")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
