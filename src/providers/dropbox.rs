//! Dropbox
//!
//! Refresh tokens are only issued when the authorization request asks for
//! offline access.  The refresh grant takes client credentials in the body.

use crate::auth::hooks::{pair, push_client_credentials, FormBody, ProviderHooks};
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::Result;
use crate::providers::OAuthProvider;

const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
const TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";

/// Dropbox OAuth provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropboxProvider;

impl ProviderHooks for DropboxProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("response_type", "code"),
            pair("redirect_uri", redirect_uri),
            pair("scope", &scopes.join(" ")),
            pair("token_access_type", "offline"),
        ])
    }

    fn build_refresh_body(
        &self,
        oauth_config: &OAuthConfig,
        refresh_token: &str,
        _prior: &Credentials,
        _scopes: &[String],
    ) -> Result<FormBody> {
        let mut body = vec![
            pair("refresh_token", refresh_token),
            pair("grant_type", "refresh_token"),
        ];
        push_client_credentials(&mut body, oauth_config);
        Ok(body)
    }
}

impl OAuthProvider for DropboxProvider {
    fn id(&self) -> &'static str {
        "dropbox"
    }

    fn name(&self) -> &'static str {
        "Dropbox"
    }

    fn default_scopes(&self) -> Vec<String> {
        [
            "account_info.read",
            "files.metadata.read",
            "files.content.read",
            "files.content.write",
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
