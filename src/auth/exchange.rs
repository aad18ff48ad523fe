//! Token endpoint requests
//!
//! Shared by the authorization-code exchange and the refresh grant: a
//! form-encoded POST with provider headers, retried with exponential
//! backoff, bounded by a per-request timeout and abortable through a
//! [`CancellationToken`].

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::hooks::{token_error_message, FormBody};
use crate::auth::metrics::TokenRequestTimer;
use crate::error::{CredflowError, Result};
use crate::retry::{with_exponential_backoff, BackoffPolicy};

/// One token endpoint call.
#[derive(Debug)]
pub struct TokenRequest<'a> {
    /// Token endpoint URL
    pub token_url: &'a str,
    /// Headers from the provider hook
    pub headers: HeaderMap,
    /// Form body from the provider hook
    pub body: FormBody,
    /// `authorization_code` or `refresh_token`, for logs and metrics
    pub grant: &'static str,
}

/// Sends `request`, retrying failures according to `policy`.
///
/// Returns the decoded JSON body of the first successful response.
///
/// # Errors
///
/// * `TokenExchange` when the endpoint answers with a non-success status
///   or a body that is not JSON
/// * `Http` for transport failures and timeouts
/// * `Cancelled` when `cancel` fires
pub async fn send_token_request(
    http: &reqwest::Client,
    request: &TokenRequest<'_>,
    timeout: Duration,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> Result<Value> {
    let label = format!("{} request to {}", request.grant, request.token_url);
    let attempt = || post_once(http, request, timeout);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CredflowError::Cancelled.into()),
        result = with_exponential_backoff(&label, policy, attempt) => result,
    }
}

async fn post_once(
    http: &reqwest::Client,
    request: &TokenRequest<'_>,
    timeout: Duration,
) -> Result<Value> {
    let _timer = TokenRequestTimer::start(request.grant);
    let response = http
        .post(request.token_url)
        .headers(request.headers.clone())
        .form(&request.body)
        .timeout(timeout)
        .send()
        .await
        .map_err(CredflowError::Http)?;

    let status = response.status();
    let text = response.text().await.map_err(CredflowError::Http)?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| token_error_message(&v))
            .unwrap_or(text);
        return Err(CredflowError::TokenExchange(format!(
            "token endpoint returned {}: {}",
            status, detail
        ))
        .into());
    }

    let value = serde_json::from_str::<Value>(&text).map_err(|e| {
        CredflowError::TokenExchange(format!("token endpoint returned invalid JSON: {}", e))
    })?;
    Ok(value)
}
