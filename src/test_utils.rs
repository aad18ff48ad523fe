//! Test utilities for Credflow
//!
//! This module provides common test helpers: temporary store roots,
//! credential fixtures and assertion helpers.

use crate::auth::types::{now_epoch, Credentials, OAuthConfig};
use crate::config::Config;
use crate::store::LocalStore;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Local store rooted in `dir`
pub fn local_store(dir: &TempDir) -> LocalStore {
    LocalStore::new(dir.path().join("oauth_configs"), dir.path().join("credentials"))
}

/// Configuration whose local backend is rooted in `dir`
///
/// Matches the layout used by [`local_store`].
pub fn local_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.store.local.oauth_config_dir = Some(dir.path().join("oauth_configs"));
    config.store.local.credentials_dir = Some(dir.path().join("credentials"));
    config
}

/// Client credentials fixture
pub fn oauth_config() -> OAuthConfig {
    OAuthConfig::new("test-client", "test-secret")
}

/// A record that expired 100 seconds ago and carries a refresh token
pub fn expired_credentials(access_token: &str, refresh_token: &str) -> Credentials {
    let mut creds = Credentials::new(access_token);
    creds.refresh_token = Some(refresh_token.to_string());
    creds.expires_at = Some(now_epoch() - 100);
    creds
}

/// A record valid for another hour
pub fn fresh_credentials(access_token: &str) -> Credentials {
    let mut creds = Credentials::new(access_token);
    creds.expires_at = Some(now_epoch() + 3600);
    creds
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
store:
  backend: local
  local:
    oauth_config_dir: /tmp/credflow/oauth_configs
    credentials_dir: /tmp/credflow/credentials

refresh:
  safety_margin_seconds: 120
  request_timeout_seconds: 10

flow:
  callback_timeout_seconds: 60
  default_port: 0
  open_browser: false

retry:
  max_retries: 2
  initial_delay_ms: 100
  max_delay_ms: 1000
  backoff_factor: 2.0
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CredflowError;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_fixtures_expiry() {
        assert!(!expired_credentials("A", "R").is_valid(0));
        assert!(fresh_credentials("A").is_valid(300));
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(CredflowError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert_eq!(config.flow.default_port, 0);
        assert!(!config.flow.open_browser);
        assert!(config.validate().is_ok());
    }
}
