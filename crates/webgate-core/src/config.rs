//! # Gateway Configuration
//!
//! Environment-driven configuration for the core engine.
//!
//! The core deliberately reads only four variables: `STATE_DIR`,
//! `DEFAULT_DAILY_LIMIT`, `MAX_WEBHOOK_ENDPOINTS_PER_TENANT`, and
//! `SESSION_KEY`. Everything else is constructed explicitly by the hosting
//! layer so tests can build engines without touching process state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::ValidationError;

/// Environment variable naming the persistent state directory
pub const ENV_STATE_DIR: &str = "STATE_DIR";

/// Environment variable for the default per-tenant daily unit budget
pub const ENV_DEFAULT_DAILY_LIMIT: &str = "DEFAULT_DAILY_LIMIT";

/// Environment variable bounding webhook endpoints per tenant
pub const ENV_MAX_WEBHOOK_ENDPOINTS: &str = "MAX_WEBHOOK_ENDPOINTS_PER_TENANT";

/// Environment variable holding the session blob encryption password
pub const ENV_SESSION_KEY: &str = "SESSION_KEY";

// ============================================================================
// Gateway Configuration
// ============================================================================

/// Configuration consumed by [`crate::engine::Engine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding `patterns.json` and `content-changes.json`
    pub state_dir: PathBuf,

    /// Daily unit budget applied when the tenant carries none
    pub default_daily_limit: u64,

    /// Upper bound of webhook endpoints a single tenant may register
    pub max_webhook_endpoints_per_tenant: usize,

    /// Session blob encryption password; `None` disables session persistence
    #[serde(skip)]
    pub session_key: Option<Zeroizing<String>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./state"),
            default_daily_limit: 10_000,
            max_webhook_endpoints_per_tenant: 10,
            session_key: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    ///
    /// Missing variables fall back to defaults; malformed numeric values are
    /// rejected rather than silently defaulted.
    pub fn from_env() -> Result<Self, ValidationError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            if dir.is_empty() {
                return Err(ValidationError::Required {
                    field: ENV_STATE_DIR.to_string(),
                });
            }
            config.state_dir = PathBuf::from(dir);
        }

        if let Ok(raw) = std::env::var(ENV_DEFAULT_DAILY_LIMIT) {
            config.default_daily_limit =
                raw.parse().map_err(|_| ValidationError::InvalidFormat {
                    field: ENV_DEFAULT_DAILY_LIMIT.to_string(),
                    message: format!("expected unsigned integer, got '{}'", raw),
                })?;
        }

        if let Ok(raw) = std::env::var(ENV_MAX_WEBHOOK_ENDPOINTS) {
            config.max_webhook_endpoints_per_tenant =
                raw.parse().map_err(|_| ValidationError::InvalidFormat {
                    field: ENV_MAX_WEBHOOK_ENDPOINTS.to_string(),
                    message: format!("expected unsigned integer, got '{}'", raw),
                })?;
        }

        if let Ok(key) = std::env::var(ENV_SESSION_KEY) {
            if !key.is_empty() {
                config.session_key = Some(Zeroizing::new(key));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_daily_limit == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "default_daily_limit".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.max_webhook_endpoints_per_tenant == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "max_webhook_endpoints_per_tenant".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Path of the persisted pattern registry
    pub fn patterns_path(&self) -> PathBuf {
        self.state_dir.join("patterns.json")
    }

    /// Path of the persisted content-change tracker
    pub fn content_changes_path(&self) -> PathBuf {
        self.state_dir.join("content-changes.json")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
