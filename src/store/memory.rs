//! In-memory credential store
//!
//! Holds OAuth configs and credential records in process memory.  Useful for
//! embedding the engines in a host that manages persistence itself, and for
//! exercising the engines without touching disk or network.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CredentialLookup, CredentialStore};
use crate::auth::types::{Credentials, OAuthConfig};
use crate::error::{CredflowError, Result};

/// Credential store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, OAuthConfig>>,
    records: RwLock<HashMap<(String, String), Credentials>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the OAuth config served for `service`.
    pub async fn put_oauth_config(&self, service: &str, config: OAuthConfig) {
        self.configs.write().await.insert(service.to_string(), config);
    }

    /// Number of stored credential records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when no credential records are stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_oauth_config(&self, service: &str) -> Result<OAuthConfig> {
        self.configs
            .read()
            .await
            .get(service)
            .cloned()
            .ok_or_else(|| {
                CredflowError::OAuthConfigMissing {
                    service: service.to_string(),
                    reason: "no configuration registered".to_string(),
                }
                .into()
            })
    }

    async fn get_user_credentials(&self, service: &str, user_id: &str) -> Result<CredentialLookup> {
        let key = (service.to_string(), user_id.to_string());
        Ok(match self.records.read().await.get(&key) {
            Some(credentials) => CredentialLookup::Found(credentials.clone()),
            None => CredentialLookup::NotFound,
        })
    }

    async fn save_user_credentials(
        &self,
        service: &str,
        user_id: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        self.records.write().await.insert(
            (service.to_string(), user_id.to_string()),
            credentials.clone(),
        );
        Ok(())
    }
}
