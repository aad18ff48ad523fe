//! Built-in OAuth providers
//!
//! Each provider pairs endpoint discovery with a [`ProviderHooks`] set.
//! The engines in [`crate::auth`] stay provider-agnostic; this module is the
//! only place that knows Dropbox wants `token_access_type=offline` or that
//! Mailchimp needs a metadata lookup.

pub mod airtable;
pub mod dropbox;
pub mod mailchimp;
pub mod notion;
pub mod salesforce;
pub mod zendesk;

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::auth::flow::AuthorizationFlow;
use crate::auth::hooks::ProviderHooks;
use crate::auth::refresh::TokenRefresher;
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::{CredflowError, Result};

pub use airtable::AirtableProvider;
pub use dropbox::DropboxProvider;
pub use mailchimp::MailchimpProvider;
pub use notion::NotionProvider;
pub use salesforce::SalesforceProvider;
pub use zendesk::ZendeskProvider;

/// A service the engines can authorize and refresh.
pub trait OAuthProvider: ProviderHooks {
    /// Service identifier; also the credential store key
    fn id(&self) -> &'static str;

    /// Human-readable provider name
    fn name(&self) -> &'static str;

    /// Scopes requested when the operator names none
    fn default_scopes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Authorization endpoint, possibly derived from `oauth_config`
    fn authorization_url(&self, oauth_config: &OAuthConfig) -> Result<String>;

    /// Token endpoint, possibly derived from `oauth_config`
    fn token_url(&self, oauth_config: &OAuthConfig) -> Result<String>;

    /// Token endpoint for refreshing `prior`.
    ///
    /// Defaults to [`Self::token_url`]; providers whose endpoint depends on
    /// account fields may fall back to the ones stored on `prior`.
    fn refresh_token_url(&self, oauth_config: &OAuthConfig, prior: &Credentials) -> Result<String> {
        let _ = prior;
        self.token_url(oauth_config)
    }

    /// This provider as its hook set
    fn as_hooks(&self) -> &dyn ProviderHooks;
}

/// Registry of OAuth providers, keyed by service id.
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Box<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    /// Creates a registry with every built-in provider.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(AirtableProvider));
        registry.register(Box::new(DropboxProvider));
        registry.register(Box::new(MailchimpProvider::new()));
        registry.register(Box::new(NotionProvider));
        registry.register(Box::new(SalesforceProvider));
        registry.register(Box::new(ZendeskProvider));
        registry
    }

    /// Creates a registry with no providers.
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Registers `provider`, replacing any provider with the same id.
    pub fn register(&mut self, provider: Box<dyn OAuthProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    /// Looks up a provider by id.
    pub fn get(&self, id: &str) -> Option<&dyn OAuthProvider> {
        self.providers.get(id).map(|p| p.as_ref())
    }

    /// Looks up a provider, failing with `ProviderNotFound`.
    pub fn require(&self, id: &str) -> Result<&dyn OAuthProvider> {
        self.get(id)
            .ok_or_else(|| CredflowError::ProviderNotFound(id.to_string()).into())
    }

    /// All providers, ordered by id.
    pub fn list(&self) -> Vec<&dyn OAuthProvider> {
        self.providers.values().map(|p| p.as_ref()).collect()
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the authorization flow for `provider`.
///
/// Endpoints are resolved from the stored OAuth config; an empty `scopes`
/// falls back to [`OAuthProvider::default_scopes`].
pub async fn authorize(
    flow: &AuthorizationFlow,
    provider: &dyn OAuthProvider,
    user_id: &str,
    scopes: &[String],
) -> Result<Credentials> {
    let service = provider.id();
    let oauth_config = flow.store().get_oauth_config(service).await?;
    let auth_url = provider.authorization_url(&oauth_config)?;
    let token_url = provider.token_url(&oauth_config)?;
    let scopes = if scopes.is_empty() {
        provider.default_scopes()
    } else {
        scopes.to_vec()
    };

    flow.run_oauth_flow(
        service,
        user_id,
        &scopes,
        &auth_url,
        &token_url,
        provider.as_hooks(),
    )
    .await
}

/// Returns ready-to-use credentials for `provider`, refreshing if needed.
///
/// The token endpoint is only resolved when a refresh grant is sent, so
/// valid records and stores that refresh remotely never need OAuth config.
pub async fn access_credentials(
    refresher: &TokenRefresher,
    provider: &dyn OAuthProvider,
    user_id: &str,
) -> Result<Credentials> {
    let token_url = |oauth_config: &OAuthConfig, prior: &Credentials| -> Result<String> {
        provider.refresh_token_url(oauth_config, prior)
    };

    refresher
        .refresh_with_resolver(
            user_id,
            provider.id(),
            &token_url,
            provider.as_hooks(),
            &CancellationToken::new(),
        )
        .await
}
