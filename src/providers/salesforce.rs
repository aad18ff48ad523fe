//! Salesforce
//!
//! PKCE with the verifier held on the in-flight OAuth config.  The login
//! host comes from the `login_domain` setting so sandboxes and My Domain
//! orgs work; the `instance_url` from the token response is preserved for
//! API calls.

use crate::auth::hooks::{pair, push_client_credentials, FormBody, ProviderHooks};
use crate::auth::pkce::PkcePair;
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::Result;
use crate::providers::OAuthProvider;

const DEFAULT_LOGIN_DOMAIN: &str = "login.salesforce.com";

/// Salesforce OAuth provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct SalesforceProvider;

fn login_domain(oauth_config: &OAuthConfig) -> &str {
    oauth_config
        .extra_str("login_domain")
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_LOGIN_DOMAIN)
}

impl ProviderHooks for SalesforceProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<FormBody> {
        let pkce = PkcePair::generate();
        let params = vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("response_type", "code"),
            pair("redirect_uri", redirect_uri),
            pair("scope", &scopes.join(" ")),
            pair("code_challenge", &pkce.challenge),
            pair("code_challenge_method", &pkce.method),
        ];
        oauth_config.code_verifier = Some(pkce.verifier);
        Ok(params)
    }

    fn build_token_body(
        &self,
        oauth_config: &OAuthConfig,
        redirect_uri: &str,
        _scopes: &[String],
        auth_code: &str,
    ) -> Result<FormBody> {
        let mut body = vec![
            pair("grant_type", "authorization_code"),
            pair("code", auth_code),
            pair("redirect_uri", redirect_uri),
        ];
        push_client_credentials(&mut body, oauth_config);
        if let Some(verifier) = &oauth_config.code_verifier {
            body.push(pair("code_verifier", verifier));
        }
        Ok(body)
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

impl OAuthProvider for SalesforceProvider {
    fn id(&self) -> &'static str {
        "salesforce"
    }

    fn name(&self) -> &'static str {
        "Salesforce"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec!["api".to_string(), "refresh_token".to_string()]
    }

    fn authorization_url(&self, oauth_config: &OAuthConfig) -> Result<String> {
        Ok(format!(
            "https://{}/services/oauth2/authorize",
            login_domain(oauth_config)
        ))
    }

    fn token_url(&self, oauth_config: &OAuthConfig) -> Result<String> {
        Ok(format!(
            "https://{}/services/oauth2/token",
            login_domain(oauth_config)
        ))
    }

    fn as_hooks(&self) -> &dyn ProviderHooks {
        self
    }
}
