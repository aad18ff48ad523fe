//! Error types for Credflow
//!
//! This module defines the error taxonomy shared by the authorization flow,
//! the refresh engine and every credential store backend, using `thiserror`
//! for ergonomic error handling.

use thiserror::Error;

/// Main error type for Credflow operations
///
/// Errors propagate to the calling integration unchanged.  Callers that need
/// to branch on the failure kind downcast the `anyhow::Error` returned by the
/// engines with `err.downcast_ref::<CredflowError>()`.
#[derive(Error, Debug)]
pub enum CredflowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider's token endpoint returned an error or omitted the access
    /// token
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// No credentials are stored for the (service, user) pair
    #[error(
        "Credentials not found for user '{user_id}' of service '{service}'. \
         Run `credflow auth {service} --user {user_id}` first."
    )]
    CredentialsNotFound {
        /// Service name
        service: String,
        /// User identifier
        user_id: String,
    },

    /// Static OAuth configuration is absent or not served by the backend
    #[error("OAuth configuration missing for service '{service}': {reason}")]
    OAuthConfigMissing {
        /// Service name
        service: String,
        /// Why the configuration could not be produced
        reason: String,
    },

    /// Credentials expired and the provider offers no refresh token
    #[error(
        "Credentials for user '{user_id}' of service '{service}' expired and cannot be refreshed"
    )]
    RefreshUnsupported {
        /// Service name
        service: String,
        /// User identifier
        user_id: String,
    },

    /// A remote credential store could not be reached or answered with a
    /// server-side failure
    #[error("Credential store '{backend}' unavailable: {reason}")]
    StoreUnavailable {
        /// Backend name
        backend: String,
        /// Failure description
        reason: String,
    },

    /// The backend does not implement an optional store operation
    #[error("Credential store '{backend}' does not support {operation}")]
    NotImplemented {
        /// Backend name
        backend: String,
        /// Name of the unsupported operation
        operation: String,
    },

    /// The authorization redirect reported an error or was malformed
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// No redirect callback arrived before the deadline
    #[error("Timed out after {0}s waiting for the authorization callback")]
    CallbackTimeout(u64),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// No provider is registered under the requested service name
    #[error("Unknown service: {0}")]
    ProviderNotFound(String),

    /// Local credential storage errors
    #[error("Storage error: {0}")]
    Store(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Credflow operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
