//! Interactive authorization-code flow
//!
//! [`AuthorizationFlow::run_oauth_flow`] performs the one-time grant for a
//! (service, user) pair:
//!
//! 1. Load the service's [`OAuthConfig`] from the credential store and
//!    require client credentials.
//! 2. Start a loopback [`CallbackServer`] on the redirect URI.
//! 3. Build the authorization URL from the provider's `build_auth_params`
//!    hook and hand it to an [`AuthorizationPresenter`].
//! 4. Wait (bounded) for the redirect; verify `state`; recover a PKCE
//!    verifier carried in a JSON `state` payload.
//! 5. Exchange the code at the token endpoint with the provider's body and
//!    header hooks, retrying transient failures.
//! 6. Normalize the response, stamp it and persist it.
//!
//! Any failing step aborts the whole flow; nothing is persisted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::callback::CallbackServer;
use crate::auth::exchange::{send_token_request, TokenRequest};
use crate::auth::hooks::{extract_verifier_from_state, ProviderHooks};
use crate::auth::metrics::record_flow;
use crate::auth::types::{now_epoch, AuthorizationState, Credentials, OAuthConfig};
use crate::config::Config;
use crate::error::{CredflowError, Result};
use crate::retry::BackoffPolicy;
use crate::store::CredentialStore;

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Shows the authorization URL to whoever completes the grant.
#[async_trait]
pub trait AuthorizationPresenter: Send + Sync {
    /// Presents `authorization_url` for `service`.
    async fn present(&self, service: &str, authorization_url: &Url) -> Result<()>;
}

/// Prints the URL and, when enabled, opens it in the system browser.
#[derive(Debug, Clone)]
pub struct BrowserPresenter {
    open_browser: bool,
}

impl BrowserPresenter {
    /// Creates a presenter; `open_browser = false` only prints the URL.
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }

    /// Best-effort browser launch; the printed URL is the fallback.
    fn try_open_browser(&self, url: &str) {
        #[cfg(target_os = "macos")]
        let result = std::process::Command::new("open").arg(url).spawn();
        #[cfg(target_os = "linux")]
        let result = std::process::Command::new("xdg-open").arg(url).spawn();
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn();
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        let result: std::io::Result<std::process::Child> = Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no browser launcher for this platform",
        ));

        if let Err(e) = result {
            tracing::debug!("Could not launch browser: {}", e);
        }
    }
}

#[async_trait]
impl AuthorizationPresenter for BrowserPresenter {
    async fn present(&self, service: &str, authorization_url: &Url) -> Result<()> {
        println!("\n===== {} Authentication =====", title_case(service));
        println!("Open the following URL in your browser to authorize access:");
        println!("{}\n", authorization_url);
        if self.open_browser {
            self.try_open_browser(authorization_url.as_str());
        }
        Ok(())
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// AuthorizationFlow
// ---------------------------------------------------------------------------

/// Timing and redirect settings for [`AuthorizationFlow`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    /// Deadline for the provider redirect
    pub callback_timeout: Duration,
    /// Port of the default redirect URI `http://localhost:<port>`
    pub default_port: u16,
    /// Timeout for each token endpoint request
    pub request_timeout: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            callback_timeout: Duration::from_secs(120),
            default_port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for FlowSettings {
    fn from(config: &Config) -> Self {
        Self {
            callback_timeout: Duration::from_secs(config.flow.callback_timeout_seconds),
            default_port: config.flow.default_port,
            request_timeout: Duration::from_secs(config.refresh.request_timeout_seconds),
        }
    }
}

/// Drives the interactive authorization-code grant.
pub struct AuthorizationFlow {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    settings: FlowSettings,
    backoff: BackoffPolicy,
    presenter: Arc<dyn AuthorizationPresenter>,
}

impl AuthorizationFlow {
    /// Creates a flow engine.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
        settings: FlowSettings,
        backoff: BackoffPolicy,
        presenter: Arc<dyn AuthorizationPresenter>,
    ) -> Self {
        Self {
            store,
            http,
            settings,
            backoff,
            presenter,
        }
    }

    /// Creates a flow engine from configuration with a [`BrowserPresenter`].
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        Self::new(
            store,
            http,
            FlowSettings::from(config),
            BackoffPolicy::from(&config.retry),
            Arc::new(BrowserPresenter::new(config.flow.open_browser)),
        )
    }

    /// Store the flow loads configuration from and saves into.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Runs the authorization flow and persists the resulting credentials.
    ///
    /// # Arguments
    ///
    /// * `service_name` - Service whose OAuth config is loaded and under
    ///   which credentials are saved
    /// * `user_id` - User the credentials belong to
    /// * `scopes` - Requested scopes
    /// * `auth_url_base` - Provider authorization endpoint
    /// * `token_url` - Provider token endpoint
    /// * `hooks` - Provider customization hooks
    ///
    /// # Errors
    ///
    /// * `OAuthConfigMissing` when the store has no usable client config
    /// * `Authorization` for provider-reported errors or a `state` mismatch
    /// * `CallbackTimeout` when no redirect arrives in time
    /// * `TokenExchange` when the code exchange fails
    pub async fn run_oauth_flow(
        &self,
        service_name: &str,
        user_id: &str,
        scopes: &[String],
        auth_url_base: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
    ) -> Result<Credentials> {
        self.run_oauth_flow_with_cancel(
            service_name,
            user_id,
            scopes,
            auth_url_base,
            token_url,
            hooks,
            &CancellationToken::new(),
        )
        .await
    }

    /// [`Self::run_oauth_flow`] that aborts with `Cancelled` when `cancel`
    /// fires.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_oauth_flow_with_cancel(
        &self,
        service_name: &str,
        user_id: &str,
        scopes: &[String],
        auth_url_base: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        tracing::info!(
            "Launching auth flow for user {} of service {}",
            user_id,
            service_name
        );
        let result = self
            .execute(
                service_name,
                user_id,
                scopes,
                auth_url_base,
                token_url,
                hooks,
                cancel,
            )
            .await;
        match &result {
            Ok(_) => {
                record_flow(service_name, "success");
                tracing::info!(
                    "Credentials saved for user {} of service {}",
                    user_id,
                    service_name
                );
            }
            Err(e) => {
                record_flow(service_name, "failed");
                tracing::error!("Auth flow for {} failed: {}", service_name, e);
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        service_name: &str,
        user_id: &str,
        scopes: &[String],
        auth_url_base: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        // Step 1: client configuration
        let mut oauth_config = self.store.get_oauth_config(service_name).await?;
        oauth_config.client_id(service_name)?;
        oauth_config.client_secret(service_name)?;

        // Step 2: callback receiver
        let configured_redirect = oauth_config
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.settings.default_port));
        let redirect_url = Url::parse(&configured_redirect).map_err(|e| {
            CredflowError::Config(format!("Invalid redirect_uri {}: {}", configured_redirect, e))
        })?;
        let mut server = CallbackServer::start(&redirect_url).await?;
        let redirect_uri =
            substitute_port(&configured_redirect, &redirect_url, server.local_addr().port());

        // Step 3: authorization URL
        let mut params = hooks.build_auth_params(&mut oauth_config, &redirect_uri, scopes)?;
        let state = match params.iter().find(|(k, _)| k == "state") {
            Some((_, value)) => value.clone(),
            None => {
                let nonce = generate_state();
                params.push(("state".to_string(), nonce.clone()));
                nonce
            }
        };
        let auth_state = AuthorizationState {
            redirect_uri: redirect_uri.clone(),
            scopes: scopes.to_vec(),
            code_verifier: oauth_config.code_verifier.clone(),
            state: Some(state),
        };
        let authorization_url = build_authorization_url(auth_url_base, &params)?;

        self.presenter.present(service_name, &authorization_url).await?;

        // Step 4: redirect
        let outcome = server.wait(self.settings.callback_timeout, cancel).await;
        server.shutdown().await;
        let outcome = outcome?;

        if outcome.state != auth_state.state {
            return Err(CredflowError::Authorization(
                "state returned on the redirect does not match the request".to_string(),
            )
            .into());
        }
        if let Some(verifier) = outcome.state.as_deref().and_then(extract_verifier_from_state) {
            oauth_config.code_verifier = Some(verifier);
        }

        // Step 5: code exchange
        let credentials = exchange_code(
            &self.http,
            &self.settings,
            &self.backoff,
            cancel,
            &oauth_config,
            &auth_state,
            token_url,
            &outcome.code,
            hooks,
        )
        .await?;

        // Step 6: persist
        self.store
            .save_user_credentials(service_name, user_id, &credentials)
            .await?;
        Ok(credentials)
    }
}

/// Exchanges `code` for tokens and normalizes the response.
#[allow(clippy::too_many_arguments)]
async fn exchange_code(
    http: &reqwest::Client,
    settings: &FlowSettings,
    backoff: &BackoffPolicy,
    cancel: &CancellationToken,
    oauth_config: &OAuthConfig,
    auth_state: &AuthorizationState,
    token_url: &str,
    code: &str,
    hooks: &dyn ProviderHooks,
) -> Result<Credentials> {
    let request = TokenRequest {
        token_url,
        headers: hooks.build_token_headers(oauth_config)?,
        body: hooks.build_token_body(
            oauth_config,
            &auth_state.redirect_uri,
            &auth_state.scopes,
            code,
        )?,
        grant: "authorization_code",
    };
    let raw = send_token_request(http, &request, settings.request_timeout, backoff, cancel).await?;
    let mut credentials = hooks.normalize_token_response(http, raw).await?;
    credentials.stamp(now_epoch());
    Ok(credentials)
}

/// Appends `params` to `auth_url_base`, keeping any query it already has.
pub fn build_authorization_url(auth_url_base: &str, params: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(auth_url_base).map_err(|e| {
        CredflowError::Config(format!("Invalid authorization endpoint {}: {}", auth_url_base, e))
    })?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Replaces an explicit `:0` port in `configured` with the bound port.
///
/// Works on the configured string rather than the parsed URL so the
/// redirect URI sent to the provider matches its registration byte for
/// byte.
fn substitute_port(configured: &str, parsed: &Url, bound_port: u16) -> String {
    if parsed.port() != Some(0) {
        return configured.to_string();
    }
    let authority_start = configured.find("://").map(|i| i + 3).unwrap_or(0);
    let (scheme, rest) = configured.split_at(authority_start);
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rfind(':') {
        Some(colon) => format!("{}{}:{}{}", scheme, &authority[..colon], bound_port, tail),
        None => configured.to_string(),
    }
}

/// Random CSRF nonce for flows whose provider sets no `state` itself.
fn generate_state() -> String {
    use rand::RngCore as _;

    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
