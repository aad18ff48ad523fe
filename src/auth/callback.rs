//! Loopback receiver for the authorization redirect
//!
//! A short-lived axum server bound to the redirect URI's port.  The first
//! request on the redirect path resolves the waiting flow: a `code` yields a
//! [`CallbackOutcome`], an `error` parameter (or a request carrying neither)
//! yields `CredflowError::Authorization`.  `/favicon.ico` is answered with
//! `204 No Content` and ignored.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{CredflowError, Result};

/// Code and state captured from the provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// Authorization code
    pub code: String,
    /// `state` echoed by the provider, if any
    pub state: Option<String>,
}

const FAVICON_PATH: &str = "/favicon.ico";

type CallbackResult = std::result::Result<CallbackOutcome, String>;
type CallbackSlot = Arc<StdMutex<Option<oneshot::Sender<CallbackResult>>>>;

/// Loopback HTTP server awaiting one redirect.
pub struct CallbackServer {
    local_addr: SocketAddr,
    redirect_uri: Url,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Binds a listener for `redirect_uri` and starts serving.
    ///
    /// The listener binds the loopback interface on the URI's port; port `0`
    /// picks an ephemeral port, which [`Self::redirect_uri`] then reports.
    ///
    /// # Errors
    ///
    /// Returns `CredflowError::Config` for a redirect URI without a usable
    /// port and `CredflowError::Io` when the port cannot be bound.
    pub async fn start(redirect_uri: &Url) -> Result<Self> {
        let port = redirect_uri.port_or_known_default().ok_or_else(|| {
            CredflowError::Config(format!("redirect_uri {} has no port", redirect_uri))
        })?;
        let ip = loopback_ip(redirect_uri);
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await.map_err(|e| {
            CredflowError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to bind callback listener on {}:{}: {}", ip, port, e),
            ))
        })?;
        let local_addr = listener.local_addr()?;

        let mut redirect_uri = redirect_uri.clone();
        if port == 0 {
            redirect_uri
                .set_port(Some(local_addr.port()))
                .map_err(|_| CredflowError::Config("redirect_uri cannot carry a port".to_string()))?;
        }

        let (result_tx, result_rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(StdMutex::new(Some(result_tx)));

        let mut app = Router::new().route(
            redirect_uri.path(),
            get(move |query: Query<HashMap<String, String>>| {
                handle_callback(query, slot.clone())
            }),
        );
        if redirect_uri.path() != FAVICON_PATH {
            app = app.route(FAVICON_PATH, get(|| async { StatusCode::NO_CONTENT }));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!("Callback server error: {}", err);
            }
        });

        tracing::debug!("Callback server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            redirect_uri,
            result_rx: Some(result_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Redirect URI with the bound port substituted.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the redirect, at most `timeout`.
    ///
    /// # Errors
    ///
    /// * `CallbackTimeout` when nothing arrives in time
    /// * `Cancelled` when `cancel` fires first
    /// * `Authorization` when the provider reported an error or the request
    ///   carried no code
    pub async fn wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CallbackOutcome> {
        let rx = self.result_rx.take().ok_or_else(|| {
            CredflowError::Authorization("callback already consumed".to_string())
        })?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CredflowError::Cancelled.into()),
            received = tokio::time::timeout(timeout, rx) => match received {
                Err(_) => Err(CredflowError::CallbackTimeout(timeout.as_secs()).into()),
                Ok(Err(_)) => Err(CredflowError::Authorization(
                    "callback server stopped before a redirect arrived".to_string(),
                )
                .into()),
                Ok(Ok(Ok(outcome))) => Ok(outcome),
                Ok(Ok(Err(message))) => Err(CredflowError::Authorization(message).into()),
            },
        }
    }

    /// Stops the server and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!("Callback server panicked: {}", err);
                }
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

fn loopback_ip(redirect_uri: &Url) -> IpAddr {
    match redirect_uri.host() {
        Some(url::Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
        Some(url::Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => {
            tracing::warn!(
                "redirect_uri host {:?} is not loopback; listening on 127.0.0.1",
                other
            );
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn handle_callback(
    Query(params): Query<HashMap<String, String>>,
    slot: CallbackSlot,
) -> Html<String> {
    let (result, message) = if let Some(error) = params.get("error") {
        let detail = match params.get("error_description") {
            Some(desc) if !desc.is_empty() => format!("{}: {}", error, desc),
            _ => error.clone(),
        };
        let message = format!("Authentication error: {}. You can close this window.", detail);
        (Err(format!("provider returned error {}", detail)), message)
    } else if let Some(code) = params.get("code") {
        let outcome = CallbackOutcome {
            code: code.clone(),
            state: params.get("state").cloned(),
        };
        (
            Ok(outcome),
            "Authentication successful! You can close this window.".to_string(),
        )
    } else {
        (
            Err("no code or error received on the redirect".to_string()),
            "Authentication failed. You can close this window.".to_string(),
        )
    };

    let sender = match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    match sender {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => tracing::debug!("Ignoring duplicate authorization callback"),
    }

    Html(render_page(&message))
}

fn render_page(message: &str) -> String {
    format!(
        "<html><head><title>OAuth Authentication</title></head><body><h1>{}</h1>\
         <script>setTimeout(function() {{ window.close(); }}, 3000);</script></body></html>",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
