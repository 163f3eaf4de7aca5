use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::cache::CredentialCache;
use crate::{Credentials, SecretError, SecretStore};

/// Connection and caching parameters for [`VaultSecretStore`]
#[derive(Clone, Debug)]
pub struct VaultSettings {
    pub address: String,
    pub token: String,
    pub mount: String,
    pub cache_ttl: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl VaultSettings {
    pub fn new(address: impl Into<String>, token: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            mount: mount.into(),
            cache_ttl: Duration::from_secs(300),
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// KV v2 backed credential store with a TTL cache
pub struct VaultSecretStore {
    client: VaultClient,
    mount: String,
    cache: CredentialCache,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl VaultSecretStore {
    pub fn new(settings: VaultSettings) -> Result<Self, SecretError> {
        info!(
            "Initializing Vault secret store at {} (mount: {}, cache TTL: {}s)",
            settings.address,
            settings.mount,
            settings.cache_ttl.as_secs()
        );

        let client_settings = VaultClientSettingsBuilder::default()
            .address(settings.address.as_str())
            .token(settings.token.as_str())
            .build()
            .map_err(|e| {
                error!("Failed to build Vault client settings: {}", e);
                SecretError::ConnectionError(e.to_string())
            })?;

        let client = VaultClient::new(client_settings).map_err(|e| {
            error!("Failed to initialize Vault client: {}", e);
            SecretError::ConnectionError(e.to_string())
        })?;

        Ok(Self {
            client,
            mount: settings.mount,
            cache: CredentialCache::new(settings.cache_ttl),
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
        })
    }

    /// Drop a cached pair so the next lookup goes back to Vault
    pub fn invalidate(&self, path: &str) {
        self.cache.invalidate(path);
    }

    async fn fetch_from_vault(&self, path: &str) -> Result<Credentials, SecretError> {
        let entries: HashMap<String, String> = kv2::read(&self.client, &self.mount, path)
            .await
            .map_err(|e| match e {
                ClientError::APIError { code: 404, .. } => SecretError::NotFound(path.to_string()),
                other => SecretError::VaultError(other),
            })?;

        Credentials::from_entries(path, entries)
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn get_credentials(&self, path: &str) -> Result<Credentials, SecretError> {
        if let Some(cached) = self.cache.get(path) {
            debug!("Cache hit for credentials at {}", path);
            return Ok(cached);
        }
        debug!("Cache miss for credentials at {}", path);

        let mut attempts = 0;
        let mut delay = self.base_delay;

        loop {
            attempts += 1;
            match self.fetch_from_vault(path).await {
                Ok(credentials) => {
                    self.cache.set(path.to_string(), credentials.clone());
                    info!("Credentials for {} retrieved and cached", path);
                    return Ok(credentials);
                }
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    warn!(
                        "Vault read for {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        path, attempts, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.max_delay);
                }
                Err(e) => {
                    error!("Failed to resolve credentials at {} after {} attempt(s): {}", path, attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
