//! Credential data model
//!
//! [`OAuthConfig`] is the static per-service client configuration,
//! [`Credentials`] is the persisted per-(service, user) token record and
//! [`AuthorizationState`] is the ephemeral state of one interactive
//! authorization attempt.
//!
//! Expiry is carried in one of two shapes: an absolute `expires_at` (epoch
//! seconds) or a relative `expires_in` anchored at `saved_at`.  Both are
//! reconciled by [`Credentials::expiry_deadline`].

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CredflowError, Result};

/// Epoch values above this are interpreted as milliseconds.
///
/// 10^11 seconds is roughly the year 5138, while 10^11 milliseconds is 1973,
/// so real timestamps never fall on the wrong side.
pub const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Default `token_type` when a provider omits it
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Current time as epoch seconds
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// OAuthConfig
// ---------------------------------------------------------------------------

/// Static OAuth client configuration for one service.
///
/// Served by the credential store (`oauth.json` for the local backend).
/// Unknown keys such as `custom_subdomain` or `login_domain` are kept in
/// [`Self::extra`] for provider hooks.
///
/// # Examples
///
/// ```
/// use credflow::auth::types::OAuthConfig;
///
/// let config: OAuthConfig = serde_json::from_str(
///     r#"{"client_id":"id","client_secret":"s","custom_subdomain":"acme"}"#,
/// ).unwrap();
/// assert_eq!(config.extra_str("custom_subdomain"), Some("acme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// PKCE verifier stashed for the duration of one authorization attempt.
    /// Never serialized.
    #[serde(skip)]
    pub code_verifier: Option<String>,

    /// Service-specific settings
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OAuthConfig {
    /// Builds a config holding only client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// Returns a string-valued extra setting.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Returns the client id, failing when it is absent or empty.
    pub fn client_id(&self, service: &str) -> Result<&str> {
        required(self.client_id.as_deref(), service, "client_id")
    }

    /// Returns the client secret, failing when it is absent or empty.
    pub fn client_secret(&self, service: &str) -> Result<&str> {
        required(self.client_secret.as_deref(), service, "client_secret")
    }
}

fn required<'a>(value: Option<&'a str>, service: &str, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CredflowError::OAuthConfigMissing {
            service: service.to_string(),
            reason: format!("{field} is not configured"),
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Token record for one (service, user) pair.
///
/// Provider-specific fields (`account_id`, `instance_url`, `dc`, ...) are
/// preserved verbatim in [`Self::extra`] and survive refreshes.
///
/// # Examples
///
/// ```
/// use credflow::auth::types::Credentials;
///
/// let mut creds = Credentials::new("abc");
/// creds.expires_at = Some(credflow::auth::types::now_epoch() + 3600);
/// assert!(creds.is_valid(300));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque bearer token
    pub access_token: String,

    /// Refresh token, absent for providers that never rotate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, `Bearer` unless the provider says otherwise
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Relative lifetime in seconds, anchored at [`Self::saved_at`]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_seconds"
    )]
    pub expires_in: Option<i64>,

    /// Absolute expiry, epoch seconds; millisecond values are converted on read
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_epoch"
    )]
    pub expires_at: Option<i64>,

    /// When the record was persisted, epoch seconds
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_seconds"
    )]
    pub saved_at: Option<i64>,

    /// Granted scopes as returned by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Provider-specific fields passed through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl Credentials {
    /// Builds a record holding only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            saved_at: None,
            scope: None,
            extra: Map::new(),
        }
    }

    /// Epoch second at which the token stops being usable, if known.
    ///
    /// `expires_at` wins over `expires_in`.  A relative lifetime without a
    /// `saved_at` anchor yields `None`.
    pub fn expiry_deadline(&self) -> Option<i64> {
        if let Some(at) = self.expires_at {
            return Some(at);
        }
        match (self.expires_in, self.saved_at) {
            (Some(lifetime), Some(saved)) => Some(saved.saturating_add(lifetime)),
            _ => None,
        }
    }

    /// Returns `true` when the token is usable at `now` with `margin_secs`
    /// to spare.  Records without expiry information are always valid.
    pub fn is_valid_at(&self, now: i64, margin_secs: i64) -> bool {
        match self.expiry_deadline() {
            Some(deadline) => now < deadline.saturating_sub(margin_secs),
            None => true,
        }
    }

    /// [`Self::is_valid_at`] against the current clock.
    pub fn is_valid(&self, margin_secs: i64) -> bool {
        self.is_valid_at(now_epoch(), margin_secs)
    }

    /// Stamps `saved_at` with `now`.
    pub fn stamp(&mut self, now: i64) {
        self.saved_at = Some(now);
    }

    /// Granted scopes split on whitespace or commas.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| {
                s.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a string-valued provider field.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Merges a refresh response onto this (prior) record.
    ///
    /// Fields present in `fresh` replace the prior ones.  `refresh_token` and
    /// `scope` carry forward when the response omits them, and prior extras
    /// survive unless `fresh` overrides the same key.  The expiry group
    /// (`expires_at`, `expires_in`, `saved_at`) always comes from `fresh` so a
    /// stale absolute expiry cannot shadow a new relative lifetime.
    ///
    /// # Examples
    ///
    /// ```
    /// use credflow::auth::types::Credentials;
    ///
    /// let mut prior = Credentials::new("A");
    /// prior.refresh_token = Some("R".into());
    /// prior.expires_at = Some(1);
    ///
    /// let mut fresh = Credentials::new("B");
    /// fresh.expires_in = Some(3600);
    ///
    /// let merged = prior.merge_refreshed(fresh);
    /// assert_eq!(merged.access_token, "B");
    /// assert_eq!(merged.refresh_token.as_deref(), Some("R"));
    /// assert_eq!(merged.expires_at, None);
    /// ```
    pub fn merge_refreshed(&self, fresh: Credentials) -> Credentials {
        let mut extra = self.extra.clone();
        extra.extend(fresh.extra);
        Credentials {
            access_token: fresh.access_token,
            refresh_token: fresh.refresh_token.or_else(|| self.refresh_token.clone()),
            token_type: fresh.token_type,
            expires_in: fresh.expires_in,
            expires_at: fresh.expires_at,
            saved_at: fresh.saved_at,
            scope: fresh.scope.or_else(|| self.scope.clone()),
            extra,
        }
    }
}

/// Reads an epoch or lifetime value from an integer, float or numeric string.
///
/// Returns `None` for anything else, including `null`.
pub fn parse_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Converts an epoch in milliseconds to seconds; seconds pass through.
pub fn normalize_epoch(value: i64) -> i64 {
    if value > EPOCH_MILLIS_THRESHOLD {
        tracing::warn!(
            "expires_at {} looks like epoch milliseconds; converting to seconds",
            value
        );
        value / 1000
    } else {
        value
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_seconds(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected seconds, found {v}"))),
    }
}

fn lenient_epoch<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_seconds(deserializer).map(|value| value.map(normalize_epoch))
}

// ---------------------------------------------------------------------------
// AuthorizationState
// ---------------------------------------------------------------------------

/// Flow-scoped state of one interactive authorization attempt.
///
/// Lives only inside [`crate::auth::flow::AuthorizationFlow`] and is never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationState {
    /// Redirect URI sent to the authorization endpoint
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// PKCE verifier, for providers that use one
    pub code_verifier: Option<String>,
    /// Exact `state` parameter sent, when the provider sets one
    pub state: Option<String>,
}
