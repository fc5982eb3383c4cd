//! Tests for CLI argument parsing

use super::*;
use clap::CommandFactory;

#[test]
fn test_cli_structure_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_parse_browse_command() {
    let cli = Cli::try_parse_from([
        "webgate",
        "browse",
        "https://example.com/page",
        "--max-tier",
        "lightweight",
        "--trace",
    ])
    .unwrap();

    match cli.command {
        Commands::Browse {
            url,
            max_tier,
            trace,
            max_latency_ms,
        } => {
            assert_eq!(url, "https://example.com/page");
            assert_eq!(max_tier, Some(Tier::Lightweight));
            assert!(trace);
            assert!(max_latency_ms.is_none());
        }
        _ => panic!("expected browse command"),
    }
}

#[test]
fn test_parse_state_command() {
    let cli = Cli::try_parse_from(["webgate", "--log-level", "debug", "state", "--tracked"])
        .unwrap();
    assert_eq!(cli.log_level, "debug");
    assert!(matches!(cli.command, Commands::State { tracked: true }));
}

#[test]
fn test_parse_domain_command() {
    let cli = Cli::try_parse_from(["webgate", "domain", "reddit.com"]).unwrap();
    match cli.command {
        Commands::Domain { domain } => assert_eq!(domain, "reddit.com"),
        _ => panic!("expected domain command"),
    }
}

#[test]
fn test_invalid_tier_rejected() {
    assert!(Cli::try_parse_from([
        "webgate",
        "browse",
        "https://example.com",
        "--max-tier",
        "warp-drive",
    ])
    .is_err());
}

#[test]
fn test_cli_tenant_has_budget() {
    let tenant = cli_tenant();
    assert_eq!(tenant.id.as_str(), "cli");
    assert!(tenant.daily_limit > 0);
}
