/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `auth`      -- run the one-time authorization flow for a service
- `token`     -- print a ready-to-use token, refreshing it when needed
- `providers` -- list the built-in services

Handlers build their engines from the loaded [`Config`] and report the
outcome on stdout/stderr.
*/

use std::sync::Arc;
use std::time::Duration;

use crate::auth::flow::AuthorizationFlow;
use crate::auth::refresh::TokenRefresher;
use crate::config::Config;
use crate::error::Result;
use crate::providers::{self as provider_registry, ProviderRegistry};
use crate::store::{build_store, CredentialStore};

/// Builds the shared HTTP client and the configured credential store.
fn build_runtime(config: &Config) -> Result<(reqwest::Client, Arc<dyn CredentialStore>)> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.refresh.request_timeout_seconds))
        .build()?;
    let store = build_store(&config.store, http.clone())?;
    Ok((http, store))
}

// Authorization command handler
pub mod auth {
    //! Interactive authorization.
    //!
    //! Resolves the provider, starts the loopback callback receiver and
    //! walks the operator through the provider's consent screen.

    use super::*;

    /// Run the authorization flow for `service` and persist the result
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `service` - Service name (e.g. "dropbox", "notion")
    /// * `user_id` - User the credentials are stored under
    /// * `scopes` - Requested scopes; empty uses the provider defaults
    pub async fn authenticate(
        config: Config,
        service: String,
        user_id: String,
        scopes: Vec<String>,
    ) -> Result<()> {
        let registry = ProviderRegistry::new();
        let provider = registry.require(&service)?;
        let (http, store) = build_runtime(&config)?;
        let flow = AuthorizationFlow::from_config(&config, store, http);

        println!(
            "{}: starting authorization for user '{}'...",
            provider.name(),
            user_id
        );
        match provider_registry::authorize(&flow, provider, &user_id, &scopes).await {
            Ok(_) => {
                println!(
                    "{}: authorization successful; credentials saved for user '{}'.",
                    provider.name(),
                    user_id
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("{}: authorization failed: {}", provider.name(), e);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_auth_unknown_service_fails() {
            let res = authenticate(
                Config::default(),
                "nope".to_string(),
                "local".to_string(),
                Vec::new(),
            )
            .await;
            assert!(res.is_err());
        }
    }
}

// Token command handler
pub mod token {
    //! Token lookup through the refresh engine.

    use super::*;

    /// Print a valid access token for `service`, or the full record as JSON
    pub async fn print_token(config: Config, service: String, user_id: String, full: bool) -> Result<()> {
        let registry = ProviderRegistry::new();
        let provider = registry.require(&service)?;
        let (http, store) = build_runtime(&config)?;
        let refresher = TokenRefresher::from_config(&config, store, http);

        let credentials = provider_registry::access_credentials(&refresher, provider, &user_id).await?;
        if full {
            println!("{}", serde_json::to_string_pretty(&credentials)?);
        } else {
            println!("{}", credentials.access_token);
        }
        Ok(())
    }

}

// Provider listing
pub mod providers {
    //! Built-in service listing.

    use super::*;

    /// Print every built-in service with its default scopes
    pub fn list() -> Result<()> {
        let registry = ProviderRegistry::new();
        println!("Built-in services:");
        for provider in registry.list() {
            let scopes = provider.default_scopes();
            if scopes.is_empty() {
                println!("  {:<12} {}", provider.id(), provider.name());
            } else {
                println!(
                    "  {:<12} {} (default scopes: {})",
                    provider.id(),
                    provider.name(),
                    scopes.join(" ")
                );
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_list_providers() {
            assert!(list().is_ok());
        }
    }
}
