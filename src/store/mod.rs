//! Pluggable credential storage
//!
//! Every backend implements [`CredentialStore`].  The authorization flow and
//! the refresh engine only ever see `Arc<dyn CredentialStore>`, so swapping
//! backends never changes their behavior.
//!
//! Lookups return a [`CredentialLookup`] rather than an `Option` so callers
//! can tell "never authorized" apart from "store temporarily unreachable".

pub mod local;
pub mod memory;
pub mod operator;
pub mod platform;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::types::{Credentials, OAuthConfig};
use crate::config::StoreConfig;
use crate::error::{CredflowError, Result};

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use operator::OperatorStore;
pub use platform::PlatformStore;

// ---------------------------------------------------------------------------
// CredentialLookup
// ---------------------------------------------------------------------------

/// Outcome of [`CredentialStore::get_user_credentials`].
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialLookup {
    /// A record exists
    Found(Credentials),
    /// The store answered and holds nothing for the pair
    NotFound,
    /// The store could not answer; the reason is for logs and operators
    Unavailable(String),
}

impl CredentialLookup {
    /// Converts the lookup into a `Result`, mapping absence to
    /// `CredentialsNotFound` and unavailability to `StoreUnavailable`.
    pub fn into_credentials(self, backend: &str, service: &str, user_id: &str) -> Result<Credentials> {
        match self {
            CredentialLookup::Found(credentials) => Ok(credentials),
            CredentialLookup::NotFound => Err(CredflowError::CredentialsNotFound {
                service: service.to_string(),
                user_id: user_id.to_string(),
            }
            .into()),
            CredentialLookup::Unavailable(reason) => Err(CredflowError::StoreUnavailable {
                backend: backend.to_string(),
                reason,
            }
            .into()),
        }
    }

    /// Returns the record when found.
    pub fn found(self) -> Option<Credentials> {
        match self {
            CredentialLookup::Found(credentials) => Some(credentials),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Capability set shared by all credential backends.
///
/// `get_oauth_config` and `save_user_credentials` are optional; the default
/// implementations fail with `OAuthConfigMissing` and `NotImplemented`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Whether the backend keeps its records fresh on its own.
    ///
    /// The refresh engine never sends refresh grants for such backends; an
    /// expired record follows the provider's refresh policy instead.
    fn refreshes_remotely(&self) -> bool {
        false
    }

    /// Loads the static OAuth configuration for `service`.
    async fn get_oauth_config(&self, service: &str) -> Result<OAuthConfig> {
        Err(CredflowError::OAuthConfigMissing {
            service: service.to_string(),
            reason: format!("the {} store does not serve OAuth configuration", self.name()),
        }
        .into())
    }

    /// Looks up the stored record for `(service, user_id)`.
    async fn get_user_credentials(&self, service: &str, user_id: &str) -> Result<CredentialLookup>;

    /// Replaces the stored record for `(service, user_id)` as a whole.
    async fn save_user_credentials(
        &self,
        service: &str,
        user_id: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let _ = (service, user_id, credentials);
        Err(CredflowError::NotImplemented {
            backend: self.name().to_string(),
            operation: "save_user_credentials".to_string(),
        }
        .into())
    }
}

/// Builds the backend selected by `config.backend`.
///
/// # Errors
///
/// Returns `CredflowError::Config` for an unknown backend or missing
/// backend settings.
pub fn build_store(config: &StoreConfig, http: reqwest::Client) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.backend.as_str() {
        "local" => Arc::new(LocalStore::new(
            config.local.resolved_oauth_config_dir()?,
            config.local.resolved_credentials_dir()?,
        )),
        "platform" => Arc::new(PlatformStore::from_config(&config.platform, http)?),
        "operator" => Arc::new(OperatorStore::from_config(&config.operator, http)?),
        other => {
            return Err(CredflowError::Config(format!("Unknown store backend: {}", other)).into())
        }
    };
    tracing::debug!("Using {} credential store", store.name());
    Ok(store)
}

/// Rejects identifiers that could escape a directory when used as a path
/// component.
pub(crate) fn validate_path_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(CredflowError::Store(format!("Invalid {}: {:?}", kind, value)).into());
    }
    Ok(())
}

/// Classifies a remote store HTTP response.
///
/// 2xx with a JSON object becomes `Found`, a bare JSON string becomes an
/// access-token-only record, and an empty payload is `NotFound`.  Any 4xx is
/// `NotFound`; 5xx and undecodable bodies are `Unavailable`.
pub(crate) fn classify_remote_payload(
    backend: &str,
    service: &str,
    user_id: &str,
    status: reqwest::StatusCode,
    payload: std::result::Result<serde_json::Value, String>,
) -> CredentialLookup {
    use serde_json::Value;

    if status.is_server_error() {
        tracing::error!(
            "{} store returned {} for user {} of service {}",
            backend,
            status,
            user_id,
            service
        );
        return CredentialLookup::Unavailable(format!("server returned {}", status));
    }
    if !status.is_success() {
        tracing::warn!(
            "{} store returned {} for user {} of service {}; treating as absent",
            backend,
            status,
            user_id,
            service
        );
        return CredentialLookup::NotFound;
    }

    let value = match payload {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("{} store returned an undecodable body: {}", backend, e);
            return CredentialLookup::Unavailable(format!("invalid response body: {}", e));
        }
    };

    match value {
        Value::Null => CredentialLookup::NotFound,
        Value::String(token) if token.is_empty() => CredentialLookup::NotFound,
        Value::String(token) => CredentialLookup::Found(Credentials::new(token)),
        Value::Object(ref map) if map.is_empty() => CredentialLookup::NotFound,
        Value::Object(_) => match serde_json::from_value::<Credentials>(value) {
            Ok(credentials) => CredentialLookup::Found(credentials),
            Err(e) => {
                tracing::error!("{} store returned malformed credentials: {}", backend, e);
                CredentialLookup::Unavailable(format!("malformed credentials: {}", e))
            }
        },
        other => {
            tracing::error!("{} store returned unexpected payload type", backend);
            CredentialLookup::Unavailable(format!("unexpected payload: {}", json_kind(&other)))
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
