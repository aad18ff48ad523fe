//! Command-line interface definition for Credflow
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the one-time authorization flow, token lookup
//! and provider listing.

use clap::{Parser, Subcommand};

/// Credflow - OAuth2 + PKCE credential lifecycle tool
///
/// Authorize a service once, then hand out fresh access tokens on demand.
#[derive(Parser, Debug, Clone)]
#[command(name = "credflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/credflow.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the credential store backend (local, platform, operator)
    #[arg(short, long, global = true)]
    pub backend: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Credflow
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the interactive authorization flow for a service
    Auth {
        /// Service to authorize (see `credflow providers`)
        service: String,

        /// User identifier the credentials are stored under
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Print the authorization URL without launching a browser
        #[arg(long)]
        no_browser: bool,

        /// Scope to request; repeatable. Defaults to the provider's scopes
        #[arg(short, long = "scope")]
        scopes: Vec<String>,
    },

    /// Print a valid access token, refreshing it if needed
    Token {
        /// Service whose token to print
        service: String,

        /// User identifier the credentials are stored under
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Print the full credential record as JSON
        #[arg(long)]
        full: bool,
    },

    /// List built-in services
    Providers,
}
