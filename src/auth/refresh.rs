//! Expiry-aware token refresh
//!
//! [`TokenRefresher`] is the steady-state path: every API call an
//! integration makes asks it for a usable token first.
//!
//! * Valid stored tokens are returned without any network call.
//! * Expired tokens with a refresh token are exchanged, merged onto the
//!   prior record (omitted fields carry forward) and persisted.
//! * Expired tokens without a refresh token follow the provider's
//!   [`RefreshPolicy`], as do expired tokens served by a store that
//!   refreshes remotely.
//!
//! Refreshes are serialized per (service, user).  A caller that waited on
//! the lock re-reads the store and returns the token another caller just
//! refreshed instead of refreshing again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::auth::exchange::{send_token_request, TokenRequest};
use crate::auth::hooks::{ProviderHooks, RefreshPolicy};
use crate::auth::metrics::{record_refresh, RefreshOutcome};
use crate::auth::types::{now_epoch, Credentials, OAuthConfig};
use crate::config::Config;
use crate::error::{CredflowError, Result};
use crate::retry::BackoffPolicy;
use crate::store::CredentialStore;

type RefreshKey = (String, String);

/// Resolves the token endpoint from the OAuth config and the prior record.
///
/// Only called when a refresh grant is actually sent.
pub type TokenUrlResolver<'a> =
    dyn Fn(&OAuthConfig, &Credentials) -> Result<String> + Send + Sync + 'a;

/// Timing settings for [`TokenRefresher`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSettings {
    /// Tokens expiring within this window are refreshed early
    pub safety_margin: Duration,
    /// Timeout for each refresh request
    pub request_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for RefreshSettings {
    fn from(config: &Config) -> Self {
        Self {
            safety_margin: Duration::from_secs(config.refresh.safety_margin_seconds),
            request_timeout: Duration::from_secs(config.refresh.request_timeout_seconds),
        }
    }
}

/// Returns ready-to-use credentials, refreshing them when needed.
///
/// Cheap to share behind an `Arc`; all state is internal.
pub struct TokenRefresher {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    settings: RefreshSettings,
    backoff: BackoffPolicy,
    locks: StdMutex<HashMap<RefreshKey, Weak<AsyncMutex<()>>>>,
}

impl TokenRefresher {
    /// Creates a refresher over `store`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
        settings: RefreshSettings,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            http,
            settings,
            backoff,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Creates a refresher from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>, http: reqwest::Client) -> Self {
        Self::new(
            store,
            http,
            RefreshSettings::from(config),
            BackoffPolicy::from(&config.retry),
        )
    }

    /// Store the refresher reads from and writes back to.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Returns a valid access token for `(service_name, user_id)`.
    ///
    /// # Errors
    ///
    /// * `CredentialsNotFound` when nothing is stored; the operator has to
    ///   run the authorization flow first
    /// * `StoreUnavailable` when the store cannot answer
    /// * `RefreshUnsupported` for expired records of `FailFast` providers
    /// * `TokenExchange` when the refresh grant fails
    pub async fn refresh_token_if_needed(
        &self,
        user_id: &str,
        service_name: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
    ) -> Result<String> {
        self.refresh_credentials_if_needed(user_id, service_name, token_url, hooks)
            .await
            .map(|credentials| credentials.access_token)
    }

    /// Like [`Self::refresh_token_if_needed`] but returns the full record,
    /// for consumers that need provider fields such as `instance_url`.
    pub async fn refresh_credentials_if_needed(
        &self,
        user_id: &str,
        service_name: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
    ) -> Result<Credentials> {
        self.refresh_with_cancel(
            user_id,
            service_name,
            token_url,
            hooks,
            &CancellationToken::new(),
        )
        .await
    }

    /// Full-record refresh that aborts with `Cancelled` when `cancel` fires.
    pub async fn refresh_with_cancel(
        &self,
        user_id: &str,
        service_name: &str,
        token_url: &str,
        hooks: &dyn ProviderHooks,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        let fixed_url =
            |_: &OAuthConfig, _: &Credentials| -> Result<String> { Ok(token_url.to_string()) };
        self.refresh_with_resolver(user_id, service_name, &fixed_url, hooks, cancel)
            .await
    }

    /// Full-record refresh whose token endpoint is derived lazily.
    ///
    /// `token_url` sees the OAuth config and the prior record, so endpoints
    /// that depend on provider fields (a tenant subdomain, say) can fall back
    /// to what the stored record carries.
    pub async fn refresh_with_resolver(
        &self,
        user_id: &str,
        service_name: &str,
        token_url: &TokenUrlResolver<'_>,
        hooks: &dyn ProviderHooks,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        let result = self
            .resolve(user_id, service_name, token_url, hooks, cancel)
            .await;
        match &result {
            Ok((_, outcome)) => record_refresh(service_name, *outcome),
            Err(_) => record_refresh(service_name, RefreshOutcome::Failed),
        }
        result.map(|(credentials, _)| credentials)
    }

    fn is_fresh(&self, credentials: &Credentials) -> bool {
        credentials.is_valid(self.margin_secs())
    }

    fn margin_secs(&self) -> i64 {
        i64::try_from(self.settings.safety_margin.as_secs()).unwrap_or(i64::MAX)
    }

    async fn load(&self, service_name: &str, user_id: &str) -> Result<Credentials> {
        let lookup = self.store.get_user_credentials(service_name, user_id).await?;
        let result = lookup.into_credentials(self.store.name(), service_name, user_id);
        if let Err(e) = &result {
            tracing::error!("{}", e);
        }
        result
    }

    async fn resolve(
        &self,
        user_id: &str,
        service_name: &str,
        token_url: &TokenUrlResolver<'_>,
        hooks: &dyn ProviderHooks,
        cancel: &CancellationToken,
    ) -> Result<(Credentials, RefreshOutcome)> {
        let stored = self.load(service_name, user_id).await?;
        if self.is_fresh(&stored) {
            tracing::debug!(
                "Stored token for user {} of {} is still valid",
                user_id,
                service_name
            );
            return Ok((stored, RefreshOutcome::Fresh));
        }

        let lock = self.lock_for(service_name, user_id);
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CredflowError::Cancelled.into()),
            guard = lock.lock() => guard,
        };

        // Another caller may have refreshed while we waited.
        let prior = self.load(service_name, user_id).await?;
        if self.is_fresh(&prior) {
            tracing::debug!(
                "Token for user {} of {} was refreshed concurrently",
                user_id,
                service_name
            );
            return Ok((prior, RefreshOutcome::Coalesced));
        }

        if self.store.refreshes_remotely() {
            tracing::debug!(
                "{} store refreshes tokens itself; not refreshing user {} of {}",
                self.store.name(),
                user_id,
                service_name
            );
            return self.handle_unrefreshable(prior, user_id, service_name, hooks);
        }

        let refresh_token = match prior.refresh_token.clone().filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return self.handle_unrefreshable(prior, user_id, service_name, hooks),
        };

        tracing::info!("Refreshing token for user {} of {}", user_id, service_name);
        let oauth_config = self.store.get_oauth_config(service_name).await?;
        let scopes = prior.scopes();
        let token_url = token_url(&oauth_config, &prior)?;
        let request = TokenRequest {
            token_url: &token_url,
            headers: hooks.build_token_headers(&oauth_config)?,
            body: hooks.build_refresh_body(&oauth_config, &refresh_token, &prior, &scopes)?,
            grant: "refresh_token",
        };
        let raw = send_token_request(
            &self.http,
            &request,
            self.settings.request_timeout,
            &self.backoff,
            cancel,
        )
        .await?;
        let mut fresh = hooks.normalize_token_response(&self.http, raw).await?;
        fresh.stamp(now_epoch());
        let merged = prior.merge_refreshed(fresh);

        self.persist(service_name, user_id, &merged).await?;
        Ok((merged, RefreshOutcome::Refreshed))
    }

    fn handle_unrefreshable(
        &self,
        prior: Credentials,
        user_id: &str,
        service_name: &str,
        hooks: &dyn ProviderHooks,
    ) -> Result<(Credentials, RefreshOutcome)> {
        match hooks.refresh_policy() {
            RefreshPolicy::ReuseExisting => {
                tracing::warn!(
                    "Token for user {} of {} is past its expiry and cannot be refreshed here; using it as-is",
                    user_id,
                    service_name
                );
                Ok((prior, RefreshOutcome::ReusedExpired))
            }
            RefreshPolicy::FailFast => Err(CredflowError::RefreshUnsupported {
                service: service_name.to_string(),
                user_id: user_id.to_string(),
            }
            .into()),
        }
    }

    async fn persist(&self, service_name: &str, user_id: &str, credentials: &Credentials) -> Result<()> {
        match self
            .store
            .save_user_credentials(service_name, user_id, credentials)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast_ref::<CredflowError>() {
                Some(CredflowError::NotImplemented { .. }) => {
                    tracing::warn!(
                        "{} store is read-only; refreshed token for user {} of {} is not persisted",
                        self.store.name(),
                        user_id,
                        service_name
                    );
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    fn lock_for(&self, service_name: &str, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|_, weak| weak.strong_count() > 0);

        let key = (service_name.to_string(), user_id.to_string());
        if let Some(existing) = locks.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }
}
