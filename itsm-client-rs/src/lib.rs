//! # ITSM Client
//!
//! Typed access to a ServiceNow instance for the change-assist services.
//!
//! This crate provides:
//!
//! - [`CmdbApi`]: configuration item lookup and relationship rows
//! - [`TicketingApi`]: change requests, change tasks, attachments, tickets
//!   and knowledge articles
//! - [`ServiceNowClient`]: the HTTP implementation of both, authenticating
//!   with a credential pair resolved through a [`secrets_client::SecretStore`]
//! - [`ServiceError`]: normalized error classification with retryability
//!
//! Reads and updates retry with exponential backoff; record creation is
//! attempted exactly once.

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod query;
pub mod retry;

pub use api::{CmdbApi, TicketingApi};
pub use client::{ServiceNowClient, ServiceNowClientBuilder};
pub use error::{CallSite, Result, ServiceError};
pub use models::{
    AttachmentRecord, ChangeRequest, ChangeTaskSummary, ConfigurationItem, CreatedRecord, Endpoint,
    KnowledgeArticle, NewChangeRequest, NewChangeTask, RelationshipEdge, Ticket, TicketUpdate,
};
pub use query::{browse_link, Condition, TimeWindow};
pub use retry::{RetryConfig, RetryExecutor};

#[cfg(test)]
mod tests;
