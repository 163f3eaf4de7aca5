//! Errors raised while talking to a ServiceNow instance
//!
//! Failures are classified by how the instance answered (ACL denial, missing
//! record, cancelled transaction) and carry a [`CallSite`] naming the table,
//! the HTTP status and the number of attempts made.

use std::fmt;
use thiserror::Error;

use secrets_client::SecretError;

pub mod mapping;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The instance could not be reached
    #[error("ServiceNow unreachable: {0}")]
    Network(String),

    /// Basic auth was rejected
    #[error("ServiceNow rejected the credentials: {0}")]
    Authentication(String),

    /// An ACL hides the record or table
    #[error("Access denied by ACL: {0}")]
    Authorization(String),

    /// An inbound REST rate limit rule fired
    #[error("Rate limited by ServiceNow: {0}")]
    RateLimit(String),

    /// The transaction failed on the instance
    #[error("ServiceNow transaction failed: {0}")]
    Service(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unexpected table API payload: {0}")]
    Parsing(String),

    #[error("Client misconfigured: {0}")]
    Configuration(String),

    #[error("ServiceNow timed out: {0}")]
    Timeout(String),

    #[error("No matching record: {0}")]
    NotFound(String),

    #[error("Credential lookup failed: {0}")]
    Credentials(#[from] SecretError),

    /// A failure annotated with the call that produced it
    #[error("{source}{site}")]
    Call {
        source: Box<ServiceError>,
        site: CallSite,
    },
}

/// Table, status and attempt count of a failed call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSite {
    pub table: Option<String>,
    pub status: Option<u16>,
    pub attempts: Option<u32>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(table) = &self.table {
            parts.push(format!("table {}", table));
        }
        if let Some(status) = self.status {
            parts.push(format!("HTTP {}", status));
        }
        if let Some(attempts) = self.attempts {
            parts.push(format!("{} attempts", attempts));
        }
        if parts.is_empty() {
            return Ok(());
        }
        write!(f, " [{}]", parts.join(", "))
    }
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ServiceError::Authorization(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        ServiceError::RateLimit(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        ServiceError::Service(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    fn annotate(self, update: impl FnOnce(&mut CallSite)) -> Self {
        match self {
            ServiceError::Call { source, mut site } => {
                update(&mut site);
                ServiceError::Call { source, site }
            }
            other => {
                let mut site = CallSite::default();
                update(&mut site);
                ServiceError::Call {
                    source: Box::new(other),
                    site,
                }
            }
        }
    }

    pub fn on_table(self, table: &str) -> Self {
        let table = table.to_string();
        self.annotate(|site| site.table = Some(table))
    }

    pub fn with_status(self, status: u16) -> Self {
        self.annotate(|site| site.status = Some(status))
    }

    pub fn after_attempts(self, attempts: u32) -> Self {
        self.annotate(|site| site.attempts = Some(attempts))
    }

    /// The classified failure without its call site
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::Call { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            ServiceError::Call { site, .. } => Some(site),
            _ => None,
        }
    }

    /// HTTP status the instance answered with, if it answered
    pub fn status_code(&self) -> Option<u16> {
        self.call_site().and_then(|site| site.status)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ServiceError::NotFound(_))
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            ServiceError::Network(_)
            | ServiceError::Timeout(_)
            | ServiceError::RateLimit(_)
            | ServiceError::Service(_) => true,
            ServiceError::Credentials(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let classified = if err.is_timeout() {
            ServiceError::timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::parsing(err.to_string())
        } else if err.is_redirect() {
            ServiceError::network(format!("redirect loop: {}", err))
        } else {
            ServiceError::network(err.to_string())
        };

        match err.status() {
            Some(status) => classified.with_status(status.as_u16()),
            None => classified,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(err.to_string())
    }
}
