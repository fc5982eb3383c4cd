//! # Webgate CLI
//!
//! Operational command-line interface for the gateway core.
//!
//! This binary exists for operators and development: single fetches,
//! configuration validation, and inspection of the persisted learning
//! state. The production surface is the hosting layer's HTTP API, not
//! this tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use webgate_core::{
    Engine, FetchOptions, GatewayConfig, Tenant, TenantId, Tier, TrackedUrlFilter,
};

// ============================================================================
// CLI Structure
// ============================================================================

/// Webgate CLI - programmable web-browsing gateway
#[derive(Parser)]
#[command(name = "webgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch-and-learn web gateway")]
#[command(
    long_about = "Webgate fetches web content through cost-ordered tiers and learns durable per-domain knowledge"
)]
pub struct Cli {
    /// State directory override
    #[arg(short, long, env = "STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch one URL and print the result as JSON
    Browse {
        /// Target URL
        url: String,

        /// Highest tier the fetch may use
        #[arg(short, long)]
        max_tier: Option<Tier>,

        /// Per-request latency budget in milliseconds
        #[arg(long)]
        max_latency_ms: Option<u64>,

        /// Include the decision trace in the output
        #[arg(short, long)]
        trace: bool,
    },

    /// Validate configuration from the environment
    Config {
        /// Show the resolved configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Inspect persisted learning state
    State {
        /// Also list tracked URLs
        #[arg(short, long)]
        tracked: bool,
    },

    /// Show everything known about one domain
    Domain {
        /// Domain to summarize
        domain: String,
    },
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Output error: {0}")]
    Output(String),
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse arguments, initialize logging, and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);
    run_command(cli).await
}

fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_command(cli: Cli) -> Result<(), CliError> {
    let mut config =
        GatewayConfig::from_env().map_err(|e| CliError::Configuration(e.to_string()))?;
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    match cli.command {
        Commands::Config { show } => {
            config
                .validate()
                .map_err(|e| CliError::Configuration(e.to_string()))?;
            info!("configuration is valid");
            if show {
                print_json(&config)?;
            }
            Ok(())
        }
        Commands::Browse {
            url,
            max_tier,
            max_latency_ms,
            trace,
        } => {
            let engine = build_engine(config).await?;
            let tenant = cli_tenant();
            let options = FetchOptions {
                max_cost_tier: max_tier,
                max_latency_ms,
                include_decision_trace: trace,
                ..Default::default()
            };

            let result = engine
                .browse(&tenant, &url, options)
                .await
                .map_err(|e| CliError::Engine(format!("{}: {}", e.code(), e)))?;
            print_json(&result)?;
            engine.shutdown().await;
            Ok(())
        }
        Commands::State { tracked } => {
            let engine = build_engine(config).await?;
            print_json(&engine.registry_stats())?;
            if tracked {
                let urls = engine.list_tracked(&TrackedUrlFilter::default());
                print_json(&urls)?;
            }
            Ok(())
        }
        Commands::Domain { domain } => {
            let engine = build_engine(config).await?;
            let summary = engine.domain_summary(&domain);
            print_json(&serde_json::json!({
                "patterns": summary.patterns,
                "anti_patterns": summary.anti_patterns,
                "learned_checks": summary.learned_checks,
            }))?;
            Ok(())
        }
    }
}

async fn build_engine(config: GatewayConfig) -> Result<Arc<Engine>, CliError> {
    Engine::new(config)
        .await
        .map(Arc::new)
        .map_err(|e| CliError::Engine(e.to_string()))
}

/// The CLI acts as a single local tenant with a generous budget
fn cli_tenant() -> Tenant {
    let id = TenantId::new("cli").unwrap_or_else(|_| unreachable!("'cli' is a valid tenant id"));
    Tenant::new(id, 1_000_000, 10_000_000)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
