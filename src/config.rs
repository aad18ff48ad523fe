//! Configuration management for Credflow
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The resulting [`Config`] is built once at process start and passed down
//! to the store factory and the engines.

use crate::error::{CredflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backend names accepted by `store.backend`
pub const VALID_BACKENDS: [&str; 3] = ["local", "platform", "operator"];

/// Main configuration structure for Credflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Credential store backend selection and settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Token refresh engine settings
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Interactive authorization flow settings
    #[serde(default)]
    pub flow: FlowConfig,
    /// Retry schedule for token endpoint calls
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Credential store configuration
///
/// Only the section matching `backend` is consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use: `local`, `platform` or `operator`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// File-backed store settings
    #[serde(default)]
    pub local: LocalStoreConfig,

    /// Platform-hosted store settings
    #[serde(default)]
    pub platform: PlatformStoreConfig,

    /// Operator-internal store settings
    #[serde(default)]
    pub operator: OperatorStoreConfig,
}

fn default_backend() -> String {
    "local".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalStoreConfig::default(),
            platform: PlatformStoreConfig::default(),
            operator: OperatorStoreConfig::default(),
        }
    }
}

/// Local file-backed store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Root holding `<service>/oauth.json`
    ///
    /// Defaults to `oauth_configs/` under the platform data directory.
    #[serde(default)]
    pub oauth_config_dir: Option<PathBuf>,

    /// Root holding `<service>/<user_id>_credentials.json`
    ///
    /// Defaults to `credentials/` under the platform data directory.
    #[serde(default)]
    pub credentials_dir: Option<PathBuf>,
}

impl LocalStoreConfig {
    /// Resolves the OAuth config root, falling back to the data directory.
    pub fn resolved_oauth_config_dir(&self) -> Result<PathBuf> {
        match &self.oauth_config_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_data_dir()?.join("oauth_configs")),
        }
    }

    /// Resolves the credentials root, falling back to the data directory.
    pub fn resolved_credentials_dir(&self) -> Result<PathBuf> {
        match &self.credentials_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_data_dir()?.join("credentials")),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "credflow", "credflow").ok_or_else(|| {
        CredflowError::Config("Could not determine the platform data directory".to_string())
    })?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// Platform-hosted store settings (bearer API key)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformStoreConfig {
    /// Base URL of the platform API
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Operator-internal store settings (HTTP Basic)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorStoreConfig {
    /// Credential lookup endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Basic auth username
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,
}

/// Token refresh engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Tokens expiring within this many seconds are refreshed early
    #[serde(default = "default_safety_margin")]
    pub safety_margin_seconds: u64,

    /// Per-request timeout for refresh grants and remote store calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_safety_margin() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            safety_margin_seconds: default_safety_margin(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Interactive authorization flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// How long to wait for the provider redirect
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,

    /// Port of the default `http://localhost:<port>` redirect URI.
    /// `0` binds an ephemeral port.
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Whether to launch the system browser
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_callback_timeout() -> u64 {
    120
}

fn default_port() -> u16 {
    8080
}

fn default_open_browser() -> bool {
    true
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            callback_timeout_seconds: default_callback_timeout(),
            default_port: default_port(),
            open_browser: default_open_browser(),
        }
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Delay multiplier
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CredflowError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CredflowError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Store overrides
        if let Ok(backend) = std::env::var("CREDFLOW_STORE_BACKEND") {
            self.store.backend = backend;
        }

        if let Ok(dir) = std::env::var("CREDFLOW_OAUTH_CONFIG_DIR") {
            self.store.local.oauth_config_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("CREDFLOW_CREDENTIALS_DIR") {
            self.store.local.credentials_dir = Some(PathBuf::from(dir));
        }

        if let Ok(url) = std::env::var("CREDFLOW_PLATFORM_API_BASE_URL") {
            self.store.platform.base_url = Some(url);
        }

        if let Ok(key) = std::env::var("CREDFLOW_PLATFORM_API_KEY") {
            self.store.platform.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("CREDFLOW_OPERATOR_API_BASE_URL") {
            self.store.operator.base_url = Some(url);
        }

        if let Ok(username) = std::env::var("CREDFLOW_OPERATOR_USERNAME") {
            self.store.operator.username = Some(username);
        }

        if let Ok(password) = std::env::var("CREDFLOW_OPERATOR_PASSWORD") {
            self.store.operator.password = Some(password);
        }

        // Engine overrides
        if let Ok(margin) = std::env::var("CREDFLOW_REFRESH_MARGIN_SECONDS") {
            if let Ok(value) = margin.parse() {
                self.refresh.safety_margin_seconds = value;
            } else {
                tracing::warn!("Invalid CREDFLOW_REFRESH_MARGIN_SECONDS: {}", margin);
            }
        }

        if let Ok(timeout) = std::env::var("CREDFLOW_CALLBACK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.flow.callback_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CREDFLOW_CALLBACK_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(backend) = &cli.backend {
            self.store.backend = backend.clone();
        }

        if let crate::cli::Commands::Auth {
            no_browser: true, ..
        } = &cli.command
        {
            self.flow.open_browser = false;
        }
    }

    /// Validate the configuration
    ///
    /// Ensures the selected backend has everything it needs and that the
    /// engine settings are usable.
    ///
    /// # Errors
    ///
    /// Returns `CredflowError::Config` if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if !VALID_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(CredflowError::Config(format!(
                "Invalid store backend: {}. Must be one of: {}",
                self.store.backend,
                VALID_BACKENDS.join(", ")
            ))
            .into());
        }

        match self.store.backend.as_str() {
            "platform" => {
                require_setting(&self.store.platform.base_url, "store.platform.base_url")?;
                require_setting(&self.store.platform.api_key, "store.platform.api_key")?;
            }
            "operator" => {
                require_setting(&self.store.operator.base_url, "store.operator.base_url")?;
                require_setting(&self.store.operator.username, "store.operator.username")?;
                require_setting(&self.store.operator.password, "store.operator.password")?;
            }
            _ => {}
        }

        if self.flow.callback_timeout_seconds == 0 {
            return Err(CredflowError::Config(
                "flow.callback_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.refresh.request_timeout_seconds == 0 {
            return Err(CredflowError::Config(
                "refresh.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
            return Err(CredflowError::Config(
                "retry.backoff_factor must be at least 1.0".to_string(),
            )
            .into());
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(CredflowError::Config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn require_setting(value: &Option<String>, name: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(CredflowError::Config(format!("{} is required", name)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cli_with(backend: Option<&str>) -> crate::cli::Cli {
        crate::cli::Cli {
            config: None,
            verbose: false,
            backend: backend.map(str::to_string),
            command: crate::cli::Commands::Providers,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, "local");
        assert_eq!(config.refresh.safety_margin_seconds, 300);
        assert_eq!(config.refresh.request_timeout_seconds, 30);
        assert_eq!(config.flow.callback_timeout_seconds, 120);
        assert_eq!(config.flow.default_port, 8080);
        assert!(config.flow.open_browser);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.retry.backoff_factor, 2.0);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_backend() {
        let mut config = Config::default();
        config.store.backend = "keychain".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid store backend"));
    }

    #[test]
    fn test_platform_backend_requires_url_and_key() {
        let mut config = Config::default();
        config.store.backend = "platform".to_string();
        assert!(config.validate().is_err());

        config.store.platform.base_url = Some("https://api.example.com".to_string());
        assert!(config.validate().is_err());

        config.store.platform.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_operator_backend_requires_basic_credentials() {
        let mut config = Config::default();
        config.store.backend = "operator".to_string();
        config.store.operator.base_url = Some("https://ops.example.com".to_string());
        config.store.operator.username = Some("svc".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.operator.password"));

        config.store.operator.password = Some("pw".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_callback_timeout_rejected() {
        let mut config = Config::default();
        config.flow.callback_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_validated() {
        let mut config = Config::default();
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.initial_delay_ms = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
store:
  backend: platform
  platform:
    base_url: https://api.example.com
    api_key: secret
refresh:
  safety_margin_seconds: 60
flow:
  default_port: 0
  open_browser: false
retry:
  max_retries: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store.backend, "platform");
        assert_eq!(
            config.store.platform.base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(config.refresh.safety_margin_seconds, 60);
        assert_eq!(config.refresh.request_timeout_seconds, 30);
        assert_eq!(config.flow.default_port, 0);
        assert!(!config.flow.open_browser);
        assert_eq!(config.flow.callback_timeout_seconds, 120);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent.yaml", &cli_with(None)).unwrap();
        assert_eq!(config.store.backend, "local");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "refresh:\n  safety_margin_seconds: 42\n").unwrap();

        let config = Config::load(path.to_str().unwrap(), &cli_with(None)).unwrap();
        assert_eq!(config.refresh.safety_margin_seconds, 42);
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "store: [not, a, map").unwrap();

        let err = Config::load(path.to_str().unwrap(), &cli_with(None)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("CREDFLOW_STORE_BACKEND", "operator");
        std::env::set_var("CREDFLOW_OPERATOR_API_BASE_URL", "https://ops.example.com");
        std::env::set_var("CREDFLOW_REFRESH_MARGIN_SECONDS", "90");
        std::env::set_var("CREDFLOW_CALLBACK_TIMEOUT_SECONDS", "not-a-number");

        let config = Config::load("nonexistent.yaml", &cli_with(None)).unwrap();

        std::env::remove_var("CREDFLOW_STORE_BACKEND");
        std::env::remove_var("CREDFLOW_OPERATOR_API_BASE_URL");
        std::env::remove_var("CREDFLOW_REFRESH_MARGIN_SECONDS");
        std::env::remove_var("CREDFLOW_CALLBACK_TIMEOUT_SECONDS");

        assert_eq!(config.store.backend, "operator");
        assert_eq!(
            config.store.operator.base_url.as_deref(),
            Some("https://ops.example.com")
        );
        assert_eq!(config.refresh.safety_margin_seconds, 90);
        // Invalid values are ignored with a warning
        assert_eq!(config.flow.callback_timeout_seconds, 120);
    }

    #[test]
    #[serial]
    fn test_cli_backend_override_wins_over_env() {
        std::env::set_var("CREDFLOW_STORE_BACKEND", "operator");
        let config = Config::load("nonexistent.yaml", &cli_with(Some("local"))).unwrap();
        std::env::remove_var("CREDFLOW_STORE_BACKEND");

        assert_eq!(config.store.backend, "local");
    }

    #[test]
    fn test_local_dirs_prefer_explicit_paths() {
        let local = LocalStoreConfig {
            oauth_config_dir: Some(PathBuf::from("/tmp/oauth")),
            credentials_dir: Some(PathBuf::from("/tmp/creds")),
        };
        assert_eq!(
            local.resolved_oauth_config_dir().unwrap(),
            PathBuf::from("/tmp/oauth")
        );
        assert_eq!(
            local.resolved_credentials_dir().unwrap(),
            PathBuf::from("/tmp/creds")
        );
    }
}
