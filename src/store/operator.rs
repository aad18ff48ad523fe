//! Operator-internal credential store
//!
//! Looks credentials up with HTTP Basic auth at
//! `GET {base_url}?service_name={service}&mcp_id={user_id}`; the record is
//! the `data` field of the response envelope.  The operator keeps tokens
//! fresh server-side and does not accept writes.

use async_trait::async_trait;
use url::Url;

use super::{classify_remote_payload, CredentialLookup, CredentialStore};
use crate::config::OperatorStoreConfig;
use crate::error::{CredflowError, Result};

/// Read-only store backed by the operator credentials endpoint.
#[derive(Debug, Clone)]
pub struct OperatorStore {
    base_url: Url,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl OperatorStore {
    /// Creates a store for `base_url` with Basic credentials.
    pub fn new(
        base_url: Url,
        username: impl Into<String>,
        password: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url,
            username: username.into(),
            password: password.into(),
            http,
        }
    }

    /// Builds the store from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CredflowError::Config` when a setting is missing or the URL
    /// does not parse.
    pub fn from_config(config: &OperatorStoreConfig, http: reqwest::Client) -> Result<Self> {
        let missing =
            |name: &str| CredflowError::Config(format!("store.operator.{} is required", name));
        let base = config.base_url.as_deref().ok_or_else(|| missing("base_url"))?;
        let username = config.username.as_deref().ok_or_else(|| missing("username"))?;
        let password = config.password.as_deref().ok_or_else(|| missing("password"))?;
        let base_url = Url::parse(base)
            .map_err(|e| CredflowError::Config(format!("Invalid operator base URL: {}", e)))?;
        Ok(Self::new(base_url, username, password, http))
    }

    /// Lookup URL for `(service, user_id)`.
    pub fn lookup_url(&self, service: &str, user_id: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("service_name", service)
            .append_pair("mcp_id", user_id);
        url
    }
}

#[async_trait]
impl CredentialStore for OperatorStore {
    fn name(&self) -> &'static str {
        "operator"
    }

    fn refreshes_remotely(&self) -> bool {
        true
    }

    async fn get_user_credentials(&self, service: &str, user_id: &str) -> Result<CredentialLookup> {
        let url = self.lookup_url(service, user_id);

        let response = match self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
        {
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
                .map(|mut envelope| {
                    envelope
                        .get_mut("data")
                        .map(serde_json::Value::take)
                        .unwrap_or_default()
                })
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
    fn test_lookup_url_appends_to_existing_query() {
        let store = OperatorStore::new(
            Url::parse("https://ops.example.com/creds?region=eu").unwrap(),
            "svc",
            "pw",
            reqwest::Client::new(),
        );
        assert_eq!(
            store.lookup_url("dropbox", "mcp-7").as_str(),
            "https://ops.example.com/creds?region=eu&service_name=dropbox&mcp_id=mcp-7"
        );
    }

    #[test]
    fn test_from_config_names_missing_setting() {
        let config = OperatorStoreConfig {
            base_url: Some("https://ops.example.com".to_string()),
            username: None,
            password: Some("pw".to_string()),
        };
        let err = OperatorStore::from_config(&config, reqwest::Client::new()).unwrap_err();
        assert!(err.to_string().contains("store.operator.username"));
    }
}
