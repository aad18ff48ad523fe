//! Mailchimp
//!
//! Mailchimp tokens never expire and carry no refresh token.  API calls need
//! the account's data-center prefix (`dc`), which the token response lacks;
//! it is resolved from the OAuth metadata endpoint during normalization and
//! stored on the record.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde_json::Value;

use crate::auth::hooks::{
    pair, push_client_credentials, standard_normalize, FormBody, ProviderHooks, RefreshPolicy,
};
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::{CredflowError, Result};
use crate::providers::OAuthProvider;

const AUTHORIZE_URL: &str = "https://login.mailchimp.com/oauth2/authorize";
const TOKEN_URL: &str = "https://login.mailchimp.com/oauth2/token";

/// Default OAuth metadata endpoint
pub const METADATA_URL: &str = "https://login.mailchimp.com/oauth2/metadata";

/// Mailchimp OAuth provider.
#[derive(Debug, Clone)]
pub struct MailchimpProvider {
    metadata_url: String,
}

impl MailchimpProvider {
    /// Creates the provider against the public metadata endpoint.
    pub fn new() -> Self {
        Self::with_metadata_url(METADATA_URL)
    }

    /// Creates the provider against a custom metadata endpoint.
    pub fn with_metadata_url(metadata_url: impl Into<String>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
        }
    }

    async fn fetch_metadata(&self, http: &reqwest::Client, access_token: &str) -> Result<Value> {
        let response = http
            .get(&self.metadata_url)
            .header(AUTHORIZATION, format!("OAuth {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredflowError::TokenExchange(format!(
                "failed to get Mailchimp metadata ({}): {}",
                status, body
            ))
            .into());
        }
        response.json::<Value>().await.map_err(|e| {
            CredflowError::TokenExchange(format!("invalid Mailchimp metadata: {}", e)).into()
        })
    }
}

impl Default for MailchimpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderHooks for MailchimpProvider {
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        _scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("response_type", "code"),
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("redirect_uri", redirect_uri),
        ])
    }

    fn build_token_body(
        &self,
        oauth_config: &OAuthConfig,
        redirect_uri: &str,
        _scopes: &[String],
        auth_code: &str,
    ) -> Result<FormBody> {
        let mut body = vec![pair("grant_type", "authorization_code")];
        push_client_credentials(&mut body, oauth_config);
        body.push(pair("redirect_uri", redirect_uri));
        body.push(pair("code", auth_code));
        Ok(body)
    }

    fn build_token_headers(&self, _oauth_config: &OAuthConfig) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn build_refresh_body(
        &self,
        _oauth_config: &OAuthConfig,
        _refresh_token: &str,
        _prior: &Credentials,
        _scopes: &[String],
    ) -> Result<FormBody> {
        Err(CredflowError::TokenExchange("Mailchimp does not issue refresh tokens".to_string()).into())
    }

    async fn normalize_token_response(
        &self,
        http: &reqwest::Client,
        raw: Value,
    ) -> Result<Credentials> {
        let mut credentials = standard_normalize(raw)?;

        let metadata = self.fetch_metadata(http, &credentials.access_token).await?;
        let dc = match metadata.get("dc").and_then(Value::as_str) {
            Some(dc) if !dc.is_empty() => dc.to_string(),
            _ => {
                return Err(CredflowError::TokenExchange(
                    "no server prefix (dc) in Mailchimp metadata".to_string(),
                )
                .into())
            }
        };
        tracing::debug!("Resolved Mailchimp server prefix {}", dc);

        credentials.extra.insert("dc".to_string(), Value::String(dc));
        if let Some(endpoint) = metadata.get("api_endpoint").and_then(Value::as_str) {
            credentials
                .extra
                .insert("api_endpoint".to_string(), Value::String(endpoint.to_string()));
        }
        Ok(credentials)
    }

    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::FailFast
    }
}

impl OAuthProvider for MailchimpProvider {
    fn id(&self) -> &'static str {
        "mailchimp"
    }

    fn name(&self) -> &'static str {
        "Mailchimp"
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_with_metadata(response: ResponseTemplate) -> (MockServer, MailchimpProvider) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/metadata"))
            .and(header("authorization", "OAuth tok"))
            .respond_with(response)
            .mount(&server)
            .await;
        let provider =
            MailchimpProvider::with_metadata_url(format!("{}/oauth2/metadata", server.uri()));
        (server, provider)
    }

    #[tokio::test]
    async fn test_normalize_resolves_server_prefix() {
        let (_server, provider) = provider_with_metadata(
            ResponseTemplate::new(200).set_body_json(json!({
                "dc": "us21",
                "api_endpoint": "https://us21.api.mailchimp.com"
            })),
        )
        .await;

        let creds = provider
            .normalize_token_response(
                &reqwest::Client::new(),
                json!({"access_token": "tok", "expires_in": 0, "scope": null}),
            )
            .await
            .unwrap();
        assert_eq!(creds.extra_str("dc"), Some("us21"));
        assert_eq!(
            creds.extra_str("api_endpoint"),
            Some("https://us21.api.mailchimp.com")
        );
    }

    #[tokio::test]
    async fn test_normalize_fails_without_server_prefix() {
        let (_server, provider) =
            provider_with_metadata(ResponseTemplate::new(200).set_body_json(json!({}))).await;
        let err = provider
            .normalize_token_response(&reqwest::Client::new(), json!({"access_token": "tok"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dc"));
    }

    #[tokio::test]
    async fn test_normalize_fails_on_metadata_error() {
        let (_server, provider) =
            provider_with_metadata(ResponseTemplate::new(401).set_body_string("bad token")).await;
        let err = provider
            .normalize_token_response(&reqwest::Client::new(), json!({"access_token": "tok"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad token"));
    }

    #[tokio::test]
    async fn test_error_response_skips_metadata_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let provider = MailchimpProvider::with_metadata_url(server.uri());
        let err = provider
            .normalize_token_response(
                &reqwest::Client::new(),
                json!({"error": "invalid_grant"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
        server.verify().await;
    }

    #[test]
    fn test_expired_records_fail_fast() {
        assert_eq!(MailchimpProvider::new().refresh_policy(), RefreshPolicy::FailFast);
    }

    #[test]
    fn test_auth_params_minimal() {
        let mut config = OAuthConfig::new("id", "secret");
        let params = MailchimpProvider::new()
            .build_auth_params(&mut config, "http://127.0.0.1:8080", &[])
            .unwrap();
        assert_eq!(params.len(), 3);
    }
}
