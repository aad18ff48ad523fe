use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;

use credflow::auth::flow::{AuthorizationFlow, AuthorizationPresenter, FlowSettings};
use credflow::auth::refresh::{RefreshSettings, TokenRefresher};
use credflow::auth::types::{now_epoch, Credentials, OAuthConfig};
use credflow::retry::BackoffPolicy;
use credflow::store::{CredentialStore, LocalStore, MemoryStore};

/// Loopback redirect with an ephemeral port
#[allow(dead_code)]
pub const EPHEMERAL_REDIRECT: &str = "http://127.0.0.1:0/callback";

#[allow(dead_code)]
pub fn token_response(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

#[allow(dead_code)]
pub fn client_config() -> OAuthConfig {
    let mut config = OAuthConfig::new("test-client", "test-secret");
    config.redirect_uri = Some(EPHEMERAL_REDIRECT.to_string());
    config
}

#[allow(dead_code)]
pub fn expired_credentials(access_token: &str, refresh_token: Option<&str>) -> Credentials {
    let mut creds = Credentials::new(access_token);
    creds.refresh_token = refresh_token.map(str::to_string);
    creds.expires_at = Some(now_epoch() - 100);
    creds
}

#[allow(dead_code)]
pub fn fast_backoff(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_factor: 2.0,
    }
}

#[allow(dead_code)]
pub fn temp_local_store() -> (LocalStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = LocalStore::new(tmp.path().join("oauth_configs"), tmp.path().join("credentials"));
    (store, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("credflow.yaml");
    std::fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub async fn memory_store_with_client(service: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_oauth_config(service, client_config()).await;
    store
}

#[allow(dead_code)]
pub fn refresher(store: Arc<dyn CredentialStore>, backoff: BackoffPolicy) -> TokenRefresher {
    TokenRefresher::new(
        store,
        reqwest::Client::new(),
        RefreshSettings {
            safety_margin: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
        },
        backoff,
    )
}

#[allow(dead_code)]
pub fn flow(
    store: Arc<dyn CredentialStore>,
    presenter: Arc<RedirectPresenter>,
    callback_timeout: Duration,
) -> AuthorizationFlow {
    AuthorizationFlow::new(
        store,
        reqwest::Client::new(),
        FlowSettings {
            callback_timeout,
            default_port: 0,
            request_timeout: Duration::from_secs(5),
        },
        BackoffPolicy::no_retry(),
        presenter,
    )
}

/// How the simulated user answers the consent screen
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Redirect {
    /// Approve and echo the request's `state`
    Approve(String),
    /// Approve but return a different `state`
    ForgedState(String),
    /// Deny with an OAuth error code
    Deny(String),
    /// Never come back
    Abandon,
}

/// Presenter that plays the browser: it follows the authorization URL's
/// `redirect_uri` straight back to the loopback receiver.
#[allow(dead_code)]
pub struct RedirectPresenter {
    redirect: Redirect,
    presented: Mutex<Option<Url>>,
}

#[allow(dead_code)]
impl RedirectPresenter {
    pub fn new(redirect: Redirect) -> Arc<Self> {
        Arc::new(Self {
            redirect,
            presented: Mutex::new(None),
        })
    }

    /// Query parameters of the last presented authorization URL
    pub fn presented_params(&self) -> HashMap<String, String> {
        self.presented
            .lock()
            .unwrap()
            .as_ref()
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default()
    }

    pub fn presented_url(&self) -> Option<Url> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationPresenter for RedirectPresenter {
    async fn present(&self, _service: &str, authorization_url: &Url) -> credflow::Result<()> {
        *self.presented.lock().unwrap() = Some(authorization_url.clone());
        let params: HashMap<String, String> =
            authorization_url.query_pairs().into_owned().collect();
        let mut target = Url::parse(&params["redirect_uri"])?;
        {
            let mut query = target.query_pairs_mut();
            match &self.redirect {
                Redirect::Approve(code) => {
                    query.append_pair("code", code);
                    if let Some(state) = params.get("state") {
                        query.append_pair("state", state);
                    }
                }
                Redirect::ForgedState(code) => {
                    query.append_pair("code", code).append_pair("state", "forged");
                }
                Redirect::Deny(error) => {
                    query.append_pair("error", error);
                }
                Redirect::Abandon => return Ok(()),
            }
        }
        reqwest::get(target).await?;
        Ok(())
    }
}

/// Decodes a form-encoded request body
#[allow(dead_code)]
pub fn form_fields(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}
