//! Platform-hosted credential store
//!
//! Credentials live behind a remote API authenticated with a bearer API key:
//! `GET {base_url}/auth/{service}/credentials?user_id={user_id}`.  The
//! platform hands out ready-to-use tokens and does not accept writes or serve
//! OAuth client configuration.

use async_trait::async_trait;
use url::Url;

use super::{classify_remote_payload, CredentialLookup, CredentialStore};
use crate::config::PlatformStoreConfig;
use crate::error::{CredflowError, Result};

/// Read-only store backed by the platform credentials API.
#[derive(Debug, Clone)]
pub struct PlatformStore {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
}

impl PlatformStore {
    /// Creates a store for `base_url` authenticated with `api_key`.
    pub fn new(base_url: Url, api_key: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            http,
        }
    }

    /// Builds the store from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CredflowError::Config` when the base URL or API key is
    /// missing, or the URL does not parse.
    pub fn from_config(config: &PlatformStoreConfig, http: reqwest::Client) -> Result<Self> {
        let base = config.base_url.as_deref().ok_or_else(|| {
            CredflowError::Config("store.platform.base_url is required".to_string())
        })?;
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            CredflowError::Config("store.platform.api_key is required".to_string())
        })?;
        let base_url = Url::parse(base)
            .map_err(|e| CredflowError::Config(format!("Invalid platform base URL: {}", e)))?;
        Ok(Self::new(base_url, api_key, http))
    }

    /// URL of the credentials endpoint for `(service, user_id)`.
    pub fn credentials_url(&self, service: &str, user_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CredflowError::Config("Platform base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["auth", service, "credentials"]);
        url.query_pairs_mut().append_pair("user_id", user_id);
        Ok(url)
    }
}

#[async_trait]
impl CredentialStore for PlatformStore {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn refreshes_remotely(&self) -> bool {
        true
    }

    async fn get_user_credentials(&self, service: &str, user_id: &str) -> Result<CredentialLookup> {
        let url = self.credentials_url(service, user_id)?;

        let response = match self.http.get(url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    "Error retrieving credentials for {} user {}: {}",
                    service,
                    user_id,
                    e
                );
                return Ok(CredentialLookup::Unavailable(e.to_string()));
            }
        };

        let status = response.status();
        let payload = if status.is_success() {
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| e.to_string())
        } else {
            Ok(serde_json::Value::Null)
        };
        Ok(classify_remote_payload(
            self.name(),
            service,
            user_id,
            status,
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_url_shape() {
        let store = PlatformStore::new(
            Url::parse("https://api.example.com/api/v1/").unwrap(),
            "key",
            reqwest::Client::new(),
        );
        let url = store.credentials_url("google drive", "a&b").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v1/auth/google%20drive/credentials?user_id=a%26b"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = PlatformStoreConfig {
            base_url: Some("https://api.example.com".to_string()),
            api_key: None,
        };
        assert!(PlatformStore::from_config(&config, reqwest::Client::new()).is_err());
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = PlatformStoreConfig {
            base_url: Some("not a url".to_string()),
            api_key: Some("k".to_string()),
        };
        let err = PlatformStore::from_config(&config, reqwest::Client::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid platform base URL"));
    }
}
