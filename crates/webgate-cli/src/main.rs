use tracing::error;
use webgate_cli::run_cli;

#[tokio::main]
async fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);

        // Exit with appropriate code based on error type
        let exit_code = match e {
            webgate_cli::CliError::Configuration(_) => 1,
            webgate_cli::CliError::Engine(_) => 2,
            webgate_cli::CliError::Output(_) => 3,
        };

        std::process::exit(exit_code);
    }
}
