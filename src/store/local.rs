//! File-backed credential store
//!
//! Layout, relative to two configurable roots:
//!
//! ```text
//! <oauth_config_dir>/<service>/oauth.json
//! <credentials_dir>/<service>/<user_id>_credentials.json
//! ```
//!
//! Records are written to a temporary sibling file and renamed into place,
//! so readers never observe a partially written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_path_component, CredentialLookup, CredentialStore};
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::{CredflowError, Result};

const OAUTH_CONFIG_FILE: &str = "oauth.json";
const CREDENTIALS_SUFFIX: &str = "_credentials.json";

/// Credential store backed by JSON files on local disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    oauth_config_dir: PathBuf,
    credentials_dir: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at the given directories. Nothing is created
    /// on disk until the first save.
    pub fn new(oauth_config_dir: impl Into<PathBuf>, credentials_dir: impl Into<PathBuf>) -> Self {
        Self {
            oauth_config_dir: oauth_config_dir.into(),
            credentials_dir: credentials_dir.into(),
        }
    }

    /// Path of the OAuth config file for `service`.
    pub fn oauth_config_path(&self, service: &str) -> Result<PathBuf> {
        validate_path_component("service name", service)?;
        Ok(self.oauth_config_dir.join(service).join(OAUTH_CONFIG_FILE))
    }

    /// Path of the credentials file for `(service, user_id)`.
    pub fn credentials_path(&self, service: &str, user_id: &str) -> Result<PathBuf> {
        validate_path_component("service name", service)?;
        validate_path_component("user id", user_id)?;
        Ok(self
            .credentials_dir
            .join(service)
            .join(format!("{}{}", user_id, CREDENTIALS_SUFFIX)))
    }

    /// Writes an OAuth config file, creating directories as needed.
    pub async fn save_oauth_config(&self, service: &str, config: &OAuthConfig) -> Result<()> {
        let path = self.oauth_config_path(service)?;
        let body = serde_json::to_vec_pretty(config)?;
        write_atomically(&path, &body).await
    }
}

#[async_trait]
impl CredentialStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_oauth_config(&self, service: &str) -> Result<OAuthConfig> {
        let path = self.oauth_config_path(service)?;
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredflowError::OAuthConfigMissing {
                    service: service.to_string(),
                    reason: format!("{} does not exist", path.display()),
                }
                .into());
            }
            Err(e) => return Err(CredflowError::Io(e).into()),
        };

        serde_json::from_slice(&contents).map_err(|e| {
            CredflowError::OAuthConfigMissing {
                service: service.to_string(),
                reason: format!("{} is not valid: {}", path.display(), e),
            }
            .into()
        })
    }

    async fn get_user_credentials(&self, service: &str, user_id: &str) -> Result<CredentialLookup> {
        let path = self.credentials_path(service, user_id)?;
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No credentials file at {}", path.display());
                return Ok(CredentialLookup::NotFound);
            }
            Err(e) => return Err(CredflowError::Io(e).into()),
        };

        let credentials: Credentials = serde_json::from_slice(&contents).map_err(|e| {
            CredflowError::Store(format!(
                "Corrupt credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(CredentialLookup::Found(credentials))
    }

    async fn save_user_credentials(
        &self,
        service: &str,
        user_id: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let path = self.credentials_path(service, user_id)?;
        let body = serde_json::to_vec_pretty(credentials)?;
        write_atomically(&path, &body).await?;
        tracing::debug!("Saved credentials to {}", path.display());
        Ok(())
    }
}

/// Writes `body` to a unique temporary sibling of `path`, then renames it
/// over `path`.
async fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    use rand::RngCore as _;

    let parent = path
        .parent()
        .ok_or_else(|| CredflowError::Store(format!("{} has no parent", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CredflowError::Store(format!("{} has no file name", path.display())))?;
    let tmp_path = parent.join(format!(
        ".{}.{:016x}.tmp",
        file_name,
        rand::rng().next_u64()
    ));

    if let Err(e) = write_private(&tmp_path, body).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(CredflowError::Io(e).into());
    }
    Ok(())
}

async fn write_private(path: &Path, body: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt as _;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}
