//! Airtable
//!
//! Airtable requires PKCE.  The verifier travels through the provider in the
//! `state` parameter as `{"code_verifier": "..."}` and is decoded back out of
//! the redirect by the flow engine.

use crate::auth::hooks::{pair, pkce_state_payload, FormBody, ProviderHooks};
use crate::auth::pkce::PkcePair;
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::Result;
use crate::providers::OAuthProvider;

const AUTHORIZE_URL: &str = "https://airtable.com/oauth2/v1/authorize";
const TOKEN_URL: &str = "https://airtable.com/oauth2/v1/token";

/// Airtable OAuth provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct AirtableProvider;

impl ProviderHooks for AirtableProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<FormBody> {
        let pkce = PkcePair::generate();
        Ok(vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("response_type", "code"),
            pair("scope", &scopes.join(" ")),
            pair("state", &pkce_state_payload(&pkce.verifier)),
            pair("redirect_uri", redirect_uri),
            pair("code_challenge", &pkce.challenge),
            pair("code_challenge_method", &pkce.method),
        ])
    }

    fn build_refresh_body(
        &self,
        oauth_config: &OAuthConfig,
        refresh_token: &str,
        _prior: &Credentials,
        scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("refresh_token", refresh_token),
            pair("grant_type", "refresh_token"),
            pair("scope", &scopes.join(" ")),
        ])
    }
}

impl OAuthProvider for AirtableProvider {
    fn id(&self) -> &'static str {
        "airtable"
    }

    fn name(&self) -> &'static str {
        "Airtable"
    }

    fn default_scopes(&self) -> Vec<String> {
        [
            "data.records:read",
            "data.records:write",
            "schema.bases:read",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn authorization_url(&self, _oauth_config: &OAuthConfig) -> Result<String> {
        Ok(AUTHORIZE_URL.to_string())
    }

    fn token_url(&self, _oauth_config: &OAuthConfig) -> Result<String> {
        Ok(TOKEN_URL.to_string())
    }

    fn as_hooks(&self) -> &dyn ProviderHooks {
        self
    }
}
