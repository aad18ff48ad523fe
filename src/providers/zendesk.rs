//! Zendesk
//!
//! Every Zendesk account lives on its own subdomain, read from the
//! `custom_subdomain` OAuth config setting or, when refreshing, from the
//! stored record.  Client credentials go in the form body; Zendesk tokens do
//! not expire.

use reqwest::header::HeaderMap;

use crate::auth::hooks::{pair, push_client_credentials, FormBody, ProviderHooks};
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::{CredflowError, Result};
use crate::providers::OAuthProvider;

/// Zendesk OAuth provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZendeskProvider;

impl ZendeskProvider {
    fn base_url(oauth_config: &OAuthConfig) -> Result<String> {
        Self::base_url_for(oauth_config.extra_str("custom_subdomain"))
    }

    fn base_url_for(subdomain: Option<&str>) -> Result<String> {
        match subdomain {
            Some(sub) if !sub.is_empty() => Ok(format!("https://{}.zendesk.com", sub)),
            _ => Err(CredflowError::Config(
                "zendesk requires `custom_subdomain` in its OAuth config".to_string(),
            )
            .into()),
        }
    }
}

impl ProviderHooks for ZendeskProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("response_type", "code"),
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("redirect_uri", redirect_uri),
            pair("scope", &scopes.join(" ")),
        ])
    }

    fn build_token_body(
        &self,
        oauth_config: &OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
        auth_code: &str,
    ) -> Result<FormBody> {
        let mut body = vec![pair("grant_type", "authorization_code"), pair("code", auth_code)];
        push_client_credentials(&mut body, oauth_config);
        body.push(pair("redirect_uri", redirect_uri));
        body.push(pair("scope", &scopes.join(" ")));
        Ok(body)
    }

    fn build_token_headers(&self, _oauth_config: &OAuthConfig) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn build_refresh_body(
        &self,
        oauth_config: &OAuthConfig,
        refresh_token: &str,
        _prior: &Credentials,
        _scopes: &[String],
    ) -> Result<FormBody> {
        let mut body = vec![
            pair("grant_type", "refresh_token"),
            pair("refresh_token", refresh_token),
        ];
        push_client_credentials(&mut body, oauth_config);
        Ok(body)
    }
}

impl OAuthProvider for ZendeskProvider {
    fn id(&self) -> &'static str {
        "zendesk"
    }

    fn name(&self) -> &'static str {
        "Zendesk"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec!["read".to_string(), "write".to_string()]
    }

    fn authorization_url(&self, oauth_config: &OAuthConfig) -> Result<String> {
        Ok(format!("{}/oauth/authorizations/new", Self::base_url(oauth_config)?))
    }

    fn token_url(&self, oauth_config: &OAuthConfig) -> Result<String> {
        Ok(format!("{}/oauth/tokens", Self::base_url(oauth_config)?))
    }

    fn refresh_token_url(&self, oauth_config: &OAuthConfig, prior: &Credentials) -> Result<String> {
        let subdomain = oauth_config
            .extra_str("custom_subdomain")
            .filter(|s| !s.is_empty())
            .or_else(|| prior.extra_str("custom_subdomain"));
        Ok(format!("{}/oauth/tokens", Self::base_url_for(subdomain)?))
    }

    fn as_hooks(&self) -> &dyn ProviderHooks {
        self
    }
}
