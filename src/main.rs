//! Credflow - OAuth2 + PKCE credential lifecycle CLI
//!
#![doc = "Credflow - OAuth2 + PKCE credential lifecycle CLI"]
#![doc = "Main entry point for the credflow binary."]

use anyhow::Result;
use clap::Parser;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use credflow::cli::{Cli, Commands};
use credflow::commands;
use credflow::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/credflow.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Auth {
            service,
            user,
            no_browser,
            scopes,
        } => {
            tracing::info!("Starting authorization for service: {}", service);
            if no_browser {
                tracing::debug!("Browser launch disabled");
            }
            commands::auth::authenticate(config, service, user, scopes).await?;
            Ok(())
        }
        Commands::Token {
            service,
            user,
            full,
        } => {
            tracing::debug!("Looking up token for user {} of {}", user, service);
            commands::token::print_token(config, service, user, full).await?;
            Ok(())
        }
        Commands::Providers => {
            commands::providers::list()?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so `credflow token` output stays pipeable.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "credflow=debug" } else { "credflow=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
