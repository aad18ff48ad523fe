//! Per-service customization seam
//!
//! The flow and refresh engines are generic; everything a provider does
//! differently (extra query parameters, where client credentials go, how
//! the token response is shaped) lives behind [`ProviderHooks`].  Every hook
//! has a default implementing plain RFC 6749 behavior, so a provider only
//! overrides what it needs.
//!
//! The refresh-body hook has one stable signature for all providers:
//! `(oauth_config, refresh_token, prior_credentials, scopes)`.  Hooks ignore
//! the arguments they don't need.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{Map, Value};

use crate::auth::types::{
    normalize_epoch, now_epoch, parse_seconds, Credentials, OAuthConfig, DEFAULT_TOKEN_TYPE,
};
use crate::error::{CredflowError, Result};

/// Form-encoded request body as ordered key/value pairs
pub type FormBody = Vec<(String, String)>;

/// What the refresh engine does with an expired record that has no refresh
/// token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Hand back the stored access token; the provider reports expiry later
    ReuseExisting,
    /// Fail with `RefreshUnsupported`
    FailFast,
}

// ---------------------------------------------------------------------------
// ProviderHooks
// ---------------------------------------------------------------------------

/// Builder and normalizer hooks consumed by the flow and refresh engines.
#[async_trait]
pub trait ProviderHooks: Send + Sync {
    /// Query parameters for the authorization request.
    ///
    /// May stash a PKCE verifier on `oauth_config.code_verifier`; the flow
    /// engine keeps that config for the code exchange.
    fn build_auth_params(
        &self,
        oauth_config: &mut OAuthConfig,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<FormBody> {
        let mut params = vec![
            pair("client_id", oauth_config.client_id.as_deref().unwrap_or_default()),
            pair("response_type", "code"),
            pair("redirect_uri", redirect_uri),
        ];
        if !scopes.is_empty() {
            params.push(pair("scope", &scopes.join(" ")));
        }
        Ok(params)
    }

    /// Form body of the authorization-code exchange.
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
        if let Some(verifier) = &oauth_config.code_verifier {
            body.push(pair("code_verifier", verifier));
        }
        Ok(body)
    }

    /// Headers for both the code exchange and the refresh grant.
    fn build_token_headers(&self, oauth_config: &OAuthConfig) -> Result<HeaderMap> {
        basic_auth_headers(oauth_config)
    }

    /// Form body of the refresh-token grant.
    fn build_refresh_body(
        &self,
        _oauth_config: &OAuthConfig,
        refresh_token: &str,
        _prior: &Credentials,
        _scopes: &[String],
    ) -> Result<FormBody> {
        Ok(vec![
            pair("grant_type", "refresh_token"),
            pair("refresh_token", refresh_token),
        ])
    }

    /// Maps a raw token endpoint response onto [`Credentials`].
    ///
    /// `http` is available for providers that need a secondary lookup.
    async fn normalize_token_response(
        &self,
        _http: &reqwest::Client,
        raw: Value,
    ) -> Result<Credentials> {
        standard_normalize(raw)
    }

    /// Behavior for expired records without a refresh token.
    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::ReuseExisting
    }
}

/// Hooks with every default in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardHooks;

impl ProviderHooks for StandardHooks {}

// ---------------------------------------------------------------------------
// Helpers shared by provider hooks
// ---------------------------------------------------------------------------

/// Builds a `(key, value)` form pair.
pub fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// `Authorization: Basic base64(client_id:client_secret)`.
///
/// # Errors
///
/// Returns `CredflowError::Config` when either client credential is
/// missing.
pub fn basic_auth_headers(oauth_config: &OAuthConfig) -> Result<HeaderMap> {
    let (id, secret) = match (&oauth_config.client_id, &oauth_config.client_secret) {
        (Some(id), Some(secret)) if !id.is_empty() => (id, secret),
        _ => {
            return Err(CredflowError::Config(
                "client_id and client_secret are required for HTTP Basic token authentication"
                    .to_string(),
            )
            .into())
        }
    };
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", id, secret));
    let value = HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|e| CredflowError::Config(format!("Invalid client credentials: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Appends `client_id` and `client_secret` to a form body, for providers
/// that take client credentials in the body instead of a Basic header.
pub fn push_client_credentials(body: &mut FormBody, oauth_config: &OAuthConfig) {
    if let Some(id) = &oauth_config.client_id {
        body.push(pair("client_id", id));
    }
    if let Some(secret) = &oauth_config.client_secret {
        body.push(pair("client_secret", secret));
    }
}

/// JSON `state` payload carrying a PKCE verifier: `{"code_verifier":"..."}`.
pub fn pkce_state_payload(verifier: &str) -> String {
    serde_json::json!({ "code_verifier": verifier }).to_string()
}

/// Decodes a verifier embedded by [`pkce_state_payload`].
///
/// Returns `None` when `state` is not JSON or has no `code_verifier`.
pub fn extract_verifier_from_state(state: &str) -> Option<String> {
    match serde_json::from_str::<Value>(state) {
        Ok(value) => value
            .get("code_verifier")
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(e) => {
            tracing::debug!("state parameter is not a JSON payload: {}", e);
            None
        }
    }
}

/// Error text of an OAuth error response, if `raw` is one.
pub fn token_error_message(raw: &Value) -> Option<String> {
    let error = raw.get("error")?;
    let code = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match raw.get("error_description").and_then(Value::as_str) {
        Some(desc) if !desc.is_empty() => Some(format!("{}: {}", code, desc)),
        _ => Some(code),
    }
}

const KNOWN_FIELDS: [&str; 7] = [
    "access_token",
    "refresh_token",
    "token_type",
    "expires_in",
    "expires_at",
    "scope",
    "saved_at",
];

/// Normalizes an RFC 6749 token response.
///
/// * `error` present, non-object body, or missing/empty `access_token`
///   fail with `CredflowError::TokenExchange`.
/// * `token_type` defaults to `Bearer`.
/// * `expires_in`/`expires_at` accept integers, floats and numeric strings;
///   anything else is a `TokenExchange` error.  An `expires_at` in epoch
///   milliseconds is converted to seconds.
/// * `scope` may be a string or an array of strings.
/// * Every other field is preserved in `extra`.
///
/// # Examples
///
/// ```
/// use credflow::auth::hooks::standard_normalize;
/// use serde_json::json;
///
/// let creds = standard_normalize(json!({
///     "access_token": "abc",
///     "refresh_token": "def",
///     "expires_in": 3600
/// })).unwrap();
/// assert_eq!(creds.access_token, "abc");
/// assert_eq!(creds.expires_in, Some(3600));
///
/// assert!(standard_normalize(json!({"error": "invalid_grant"})).is_err());
/// assert!(standard_normalize(json!({})).is_err());
/// ```
pub fn standard_normalize(raw: Value) -> Result<Credentials> {
    if let Some(message) = token_error_message(&raw) {
        return Err(CredflowError::TokenExchange(message).into());
    }
    let mut map = match raw {
        Value::Object(map) => map,
        _ => {
            return Err(CredflowError::TokenExchange(
                "token endpoint returned a non-object response".to_string(),
            )
            .into())
        }
    };

    let access_token = match map.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => {
            return Err(CredflowError::TokenExchange(
                "response is missing access_token".to_string(),
            )
            .into())
        }
    };

    let mut credentials = Credentials::new(access_token);
    credentials.refresh_token = map
        .get("refresh_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    credentials.token_type = map
        .get("token_type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TOKEN_TYPE)
        .to_string();
    credentials.expires_in = seconds_field(&map, "expires_in")?;
    credentials.expires_at = seconds_field(&map, "expires_at")?.map(normalize_epoch);
    credentials.scope = scope_field(&map);

    for key in KNOWN_FIELDS {
        map.remove(key);
    }
    credentials.extra = map;
    Ok(credentials)
}

fn seconds_field(map: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_seconds(value).map(Some).ok_or_else(|| {
            CredflowError::TokenExchange(format!("unparseable {}: {}", key, value)).into()
        }),
    }
}

fn scope_field(map: &Map<String, Value>) -> Option<String> {
    match map.get("scope")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

/// Absolute expiry from a lifetime, relative to now.
pub fn expires_at_from_now(lifetime_secs: i64) -> i64 {
    now_epoch().saturating_add(lifetime_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_exchange_error(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<CredflowError>(),
            Some(CredflowError::TokenExchange(_))
        )
    }

    #[test]
    fn test_normalize_rejects_error_response() {
        let err = standard_normalize(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        }))
        .unwrap_err();
        assert!(token_exchange_error(&err));
        assert!(err.to_string().contains("invalid_grant: refresh token revoked"));
    }

    #[test]
    fn test_normalize_rejects_missing_access_token() {
        let err = standard_normalize(json!({})).unwrap_err();
        assert!(token_exchange_error(&err));
        let err = standard_normalize(json!({"access_token": ""})).unwrap_err();
        assert!(token_exchange_error(&err));
        let err = standard_normalize(json!("just a string")).unwrap_err();
        assert!(token_exchange_error(&err));
    }

    #[test]
    fn test_normalize_populates_standard_fields() {
        let creds = standard_normalize(json!({
            "access_token": "abc",
            "refresh_token": "def",
            "expires_in": 3600,
            "token_type": "bearer",
            "scope": ["a", "b"],
            "account_id": "acct"
        }))
        .unwrap();
        assert_eq!(creds.access_token, "abc");
        assert_eq!(creds.refresh_token.as_deref(), Some("def"));
        assert_eq!(creds.expires_in, Some(3600));
        assert_eq!(creds.token_type, "bearer");
        assert_eq!(creds.scope.as_deref(), Some("a b"));
        assert_eq!(creds.extra_str("account_id"), Some("acct"));
        assert!(!creds.extra.contains_key("access_token"));
        assert_eq!(creds.saved_at, None);
    }

    #[test]
    fn test_normalize_defaults_token_type() {
        let creds = standard_normalize(json!({"access_token": "abc"})).unwrap();
        assert_eq!(creds.token_type, "Bearer");
        assert_eq!(creds.expires_in, None);
        assert_eq!(creds.expires_at, None);
    }

    #[test]
    fn test_normalize_converts_millisecond_expiry() {
        let creds =
            standard_normalize(json!({"access_token": "abc", "expires_at": 1_700_000_000_000i64}))
                .unwrap();
        assert_eq!(creds.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn test_normalize_rejects_unparseable_lifetime() {
        let err =
            standard_normalize(json!({"access_token": "abc", "expires_in": "an hour"})).unwrap_err();
        assert!(token_exchange_error(&err));
        assert!(err.to_string().contains("expires_in"));
    }

    #[test]
    fn test_basic_auth_header_encoding() {
        let headers = basic_auth_headers(&OAuthConfig::new("client", "secret")).unwrap();
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            "Basic Y2xpZW50OnNlY3JldA=="
        );
    }

    #[test]
    fn test_basic_auth_requires_credentials() {
        assert!(basic_auth_headers(&OAuthConfig::default()).is_err());
    }

    #[test]
    fn test_state_payload_round_trip() {
        let state = pkce_state_payload("verifier-123");
        assert_eq!(state, r#"{"code_verifier":"verifier-123"}"#);
        assert_eq!(
            extract_verifier_from_state(&state).as_deref(),
            Some("verifier-123")
        );
        assert_eq!(extract_verifier_from_state("opaque-state"), None);
        assert_eq!(extract_verifier_from_state(r#"{"nonce":"x"}"#), None);
    }

    #[test]
    fn test_default_auth_params() {
        let mut config = OAuthConfig::new("id", "secret");
        let params = StandardHooks
            .build_auth_params(
                &mut config,
                "http://localhost:8080",
                &["read".to_string(), "write".to_string()],
            )
            .unwrap();
        assert!(params.contains(&pair("client_id", "id")));
        assert!(params.contains(&pair("response_type", "code")));
        assert!(params.contains(&pair("scope", "read write")));
    }

    #[test]
    fn test_default_token_body_includes_stashed_verifier() {
        let mut config = OAuthConfig::new("id", "secret");
        config.code_verifier = Some("v".to_string());
        let body = StandardHooks
            .build_token_body(&config, "http://localhost:8080", &[], "code-1")
            .unwrap();
        assert!(body.contains(&pair("grant_type", "authorization_code")));
        assert!(body.contains(&pair("code", "code-1")));
        assert!(body.contains(&pair("code_verifier", "v")));
    }

    #[test]
    fn test_default_refresh_body() {
        let body = StandardHooks
            .build_refresh_body(&OAuthConfig::default(), "R1", &Credentials::new("A"), &[])
            .unwrap();
        assert_eq!(
            body,
            vec![pair("grant_type", "refresh_token"), pair("refresh_token", "R1")]
        );
    }

    #[test]
    fn test_push_client_credentials() {
        let mut body = vec![pair("grant_type", "refresh_token")];
        push_client_credentials(&mut body, &OAuthConfig::new("id", "secret"));
        assert!(body.contains(&pair("client_id", "id")));
        assert!(body.contains(&pair("client_secret", "secret")));
    }
}
