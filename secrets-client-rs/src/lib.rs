//! Credential lookup for the ticketing integration.
//!
//! Every secret path resolves to exactly one username/password pair. The
//! Vault-backed store reads a KV v2 secret whose single entry maps the
//! username to the password; the static store serves tests and deployments
//! that inject credentials through the environment.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use vaultrs::error::ClientError;

mod cache;
pub mod static_store;
pub mod vault;

pub use static_store::StaticSecretStore;
pub use vault::{VaultSecretStore, VaultSettings};

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Vault client error: {0}")]
    VaultError(#[from] ClientError),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret at {path} holds {count} entries, expected exactly one credential pair")]
    AmbiguousCredentials { path: String, count: usize },

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl SecretError {
    /// Only transport-level Vault failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SecretError::VaultError(ClientError::APIError { code, .. }) => *code >= 500,
            SecretError::VaultError(_) | SecretError::ConnectionError(_) => true,
            _ => false,
        }
    }
}

/// A resolved username/password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build a pair from the raw entries stored at `path`.
    ///
    /// Zero entries is `NotFound`; more than one is `AmbiguousCredentials`.
    pub fn from_entries(path: &str, entries: HashMap<String, String>) -> Result<Self, SecretError> {
        let count = entries.len();
        let mut iter = entries.into_iter();
        match (iter.next(), count) {
            (Some((username, password)), 1) => Ok(Self { username, password }),
            (None, _) => Err(SecretError::NotFound(path.to_string())),
            _ => Err(SecretError::AmbiguousCredentials {
                path: path.to_string(),
                count,
            }),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Resolves credential pairs by logical secret path
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_credentials(&self, path: &str) -> Result<Credentials, SecretError>;
}
