//! mockall doubles for the engine seams

use async_trait::async_trait;
use mockall::mock;

use itsm_client::{
    AttachmentRecord, ChangeRequest, ChangeTaskSummary, CmdbApi, Condition, ConfigurationItem,
    CreatedRecord, KnowledgeArticle, NewChangeRequest, NewChangeTask, RelationshipEdge, Result,
    Ticket, TicketUpdate, TicketingApi, TimeWindow,
};
use kb_retriever::{RelevanceRetriever, RetrieverError, ScoredDocument};
use llm_gateway::{ChatMessage, LlmError, TextGenerator};

mock! {
    pub Ticketing {}

    #[async_trait]
    impl TicketingApi for Ticketing {
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
}

mock! {
    pub Cmdb {}

    #[async_trait]
    impl CmdbApi for Cmdb {
        async fn find_configuration_items(&self, name_or_ip: &str) -> Result<Vec<ConfigurationItem>>;
        async fn get_ci_relationships(&self, ci_sys_id: &str) -> Result<Vec<RelationshipEdge>>;
    }
}

mock! {
    pub Retriever {}

    #[async_trait]
    impl RelevanceRetriever for Retriever {
        async fn search(&self, query: &str, k: usize) -> std::result::Result<Vec<ScoredDocument>, RetrieverError>;
    }
}

mock! {
    pub Generator {}

    #[async_trait]
    impl TextGenerator for Generator {
        async fn generate(&self, messages: Vec<ChatMessage>) -> std::result::Result<String, LlmError>;
        async fn generate_with_image(
            &self,
            prompt: &str,
            image: &[u8],
            mime_type: &str,
        ) -> std::result::Result<String, LlmError>;
    }
}

pub fn edge(parent: &str, child: &str, relation: &str) -> RelationshipEdge {
    RelationshipEdge {
        parent: parent.to_string(),
        child: child.to_string(),
        parent_name: parent.to_string(),
        parent_class: "cmdb_ci_appl".to_string(),
        child_name: child.to_string(),
        child_class: "cmdb_ci_server".to_string(),
        type_name: relation.to_string(),
        ..RelationshipEdge::default()
    }
}

pub fn created(number: &str, sys_id: &str) -> CreatedRecord {
    CreatedRecord {
        number: number.to_string(),
        sys_id: sys_id.to_string(),
        target_link: format!(
            "https://example.service-now.com/now/nav/ui/classic/params/target/change_task.do%3Fsys_id%3D{}",
            sys_id
        ),
    }
}
