//! Notion
//!
//! Notion access tokens never expire and no refresh token is issued; the
//! workspace fields of the token response are kept on the record.

use crate::auth::hooks::{pair, FormBody, ProviderHooks};
use crate::auth::types::OAuthConfig;
use crate::error::Result;
use crate::providers::OAuthProvider;

const AUTHORIZE_URL: &str = "https://api.notion.com/v1/oauth/authorize";
const TOKEN_URL: &str = "https://api.notion.com/v1/oauth/token";

/// Notion OAuth provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotionProvider;

impl ProviderHooks for NotionProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        _scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("response_type", "code"),
            pair("owner", "user"),
            pair("redirect_uri", redirect_uri),
        ])
    }
}

impl OAuthProvider for NotionProvider {
    fn id(&self) -> &'static str {
        "notion"
    }

    fn name(&self) -> &'static str {
        "Notion"
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
