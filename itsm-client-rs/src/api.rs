//! Seams the change engines depend on.
//!
//! [`CmdbApi`] covers the configuration graph, [`TicketingApi`] the change,
//! ticket and knowledge tables. Both are object safe so callers can hold
//! `Arc<dyn ...>` and substitute doubles in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AttachmentRecord, ChangeRequest, ChangeTaskSummary, ConfigurationItem, CreatedRecord,
    KnowledgeArticle, NewChangeRequest, NewChangeTask, RelationshipEdge, Ticket, TicketUpdate,
};
use crate::query::{Condition, TimeWindow};

/// Read access to configuration items and their relationships
#[async_trait]
pub trait CmdbApi: Send + Sync {
    /// CIs whose name contains `name_or_ip` or whose IP equals it
    async fn find_configuration_items(&self, name_or_ip: &str) -> Result<Vec<ConfigurationItem>>;

    /// Every relationship row where `ci_sys_id` is the parent or the child
    async fn get_ci_relationships(&self, ci_sys_id: &str) -> Result<Vec<RelationshipEdge>>;
}

/// Change, ticket and knowledge operations
#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Single change by number; `NotFound` when absent
    async fn get_change_request(&self, number: &str) -> Result<ChangeRequest>;

    async fn get_change_requests(
        &self,
        window: Option<TimeWindow>,
        conditions: Vec<Condition>,
    ) -> Result<Vec<ChangeRequest>>;

    async fn get_change_tasks(&self, change_sys_id: &str) -> Result<Vec<ChangeTaskSummary>>;

    async fn create_change_request(&self, change: &NewChangeRequest) -> Result<CreatedRecord>;

    async fn create_change_task(&self, task: &NewChangeTask) -> Result<CreatedRecord>;

    async fn attach_file(
        &self,
        table: &str,
        record_sys_id: &str,
        file_name: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<AttachmentRecord>;

    async fn get_tickets(
        &self,
        table: &str,
        window: Option<TimeWindow>,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Ticket>>;

    async fn update_ticket(&self, table: &str, sys_id: &str, update: &TicketUpdate) -> Result<CreatedRecord>;

    async fn get_knowledge_articles(&self, conditions: Vec<Condition>) -> Result<Vec<KnowledgeArticle>>;

    async fn create_knowledge_article(&self, short_description: &str, text: &str) -> Result<CreatedRecord>;

    async fn update_knowledge_article(&self, sys_id: &str, text: &str) -> Result<CreatedRecord>;
}
