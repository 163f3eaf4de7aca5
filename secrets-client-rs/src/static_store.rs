use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::{Credentials, SecretError, SecretStore};

/// In-process credential map, for tests and for deployments without Vault
#[derive(Clone, Debug, Default)]
pub struct StaticSecretStore {
    entries: HashMap<String, Credentials>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, path: impl Into<String>, credentials: Credentials) -> Self {
        self.entries.insert(path.into(), credentials);
        self
    }

    /// Serve `path` from `SNOW_USERNAME` / `SNOW_PASSWORD`.
    ///
    /// Returns an empty store when either variable is unset.
    pub fn from_env(path: &str) -> Self {
        match (std::env::var("SNOW_USERNAME"), std::env::var("SNOW_PASSWORD")) {
            (Ok(username), Ok(password)) => {
                debug!("Using environment credentials for {}", path);
                Self::new().with_credentials(path, Credentials::new(username, password))
            }
            _ => Self::new(),
        }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_credentials(&self, path: &str) -> Result<Credentials, SecretError> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(path.to_string()))
    }
}
