//! Credflow - OAuth2 + PKCE credential lifecycle library
//!
//! This library obtains OAuth2 credentials for third-party services once,
//! through an interactive authorization-code flow, and hands out valid
//! access tokens afterwards, refreshing them transparently.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE, the authorization flow engine, the token refresh engine
//!   and the per-provider hook seam
//! - `store`: the `CredentialStore` trait and its local, platform and
//!   operator backends
//! - `providers`: built-in provider hook sets and the provider registry
//! - `retry`: exponential backoff for transient failures
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use credflow::{Config, ProviderRegistry, TokenRefresher};
//! use credflow::store::build_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let http = reqwest::Client::new();
//!     let store = build_store(&config.store, http.clone())?;
//!     let refresher = TokenRefresher::from_config(&config, store, http);
//!
//!     let registry = ProviderRegistry::new();
//!     let dropbox = registry.require("dropbox")?;
//!     let creds = credflow::providers::access_credentials(&refresher, dropbox, "local").await?;
//!     println!("token expires at {:?}", creds.expiry_deadline());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod providers;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use auth::{AuthorizationFlow, Credentials, OAuthConfig, TokenRefresher};
pub use config::Config;
pub use error::{CredflowError, Result};
pub use providers::{OAuthProvider, ProviderRegistry};
pub use store::{CredentialLookup, CredentialStore};

#[cfg(test)]
pub mod test_utils;
