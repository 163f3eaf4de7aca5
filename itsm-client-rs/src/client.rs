//! ServiceNow table API client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use secrets_client::{Credentials, SecretStore};

use crate::api::{CmdbApi, TicketingApi};
use crate::error::mapping::{is_retryable_status, map_http_error};
use crate::error::{Result, ServiceError};
use crate::models::{
    AttachmentRecord, ChangeRequest, ChangeTaskSummary, ConfigurationItem, CreatedRecord,
    KnowledgeArticle, NewChangeRequest, NewChangeTask, RelationshipEdge, TableResponse, Ticket,
    TicketUpdate,
};
use crate::query::{
    browse_link, encode_conditions, escape_query_value, join_query, kb_view_link, Condition, TimeWindow,
};
use crate::retry::{RetryConfig, RetryExecutor};

const USER_AGENT: &str = concat!("itsm-change-assist/", env!("CARGO_PKG_VERSION"), " (itsm-client)");

const CHANGE_FIELDS: &str = "sys_id,number,short_description,description,implementation_plan,backout_plan,test_plan,assignment_group,start_date,end_date,state,chg_model,approval,cmdb_ci";
const TICKET_FIELDS: &str = "sys_id,number,caller_id,location,sys_created_by,opened_by,sys_created_on,state,hold_reason,cmdb_ci,priority,category,subcategory,assignment_group,assigned_to,short_description,description,comments_and_work_notes";
const RELATIONSHIP_FIELDS: &str = "parent,child,type,parent.name,parent.sys_class_name,parent.ip_address,child.name,child.sys_class_name,child.ip_address,type.name";
const CI_FIELDS: &str = "sys_id,name,sys_class_name,ip_address";
const CHANGE_TASK_FIELDS: &str = "number,short_description,assignment_group.name";
const KB_FIELDS: &str = "sys_id,number,short_description,text,kb_category,workflow_state";

/// Build the shared HTTP client
fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Client for the table, CMDB and attachment endpoints of one instance
pub struct ServiceNowClient {
    http_client: Client,
    base_url: String,
    secret_path: String,
    secrets: Arc<dyn SecretStore>,
    retry: RetryExecutor,
}

impl ServiceNowClient {
    pub fn builder() -> ServiceNowClientBuilder {
        ServiceNowClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/api/now/table/{}", self.base_url, table)
    }

    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.secrets.get_credentials(&self.secret_path).await?)
    }

    async fn send<R>(&self, table: &str, builder: RequestBuilder) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let credentials = self.credentials().await?;
        let start = Instant::now();

        let response = builder
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|e| ServiceError::from(e).on_table(table))?;

        let status = response.status();
        debug!("{} answered {} in {:?}", table, status, start.elapsed());

        if status.is_success() {
            let body: TableResponse<R> = response.json().await.map_err(|e| {
                ServiceError::parsing(format!("Failed to parse response: {}", e)).on_table(table)
            })?;
            return Ok(body.result);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
        let error = map_http_error(status, &body).on_table(table);
        if is_retryable_status(status) {
            warn!("{} failed with retryable status {}: {}", table, status, error);
        }
        Err(error)
    }

    /// Query a table; single-object results are normalized to one-element lists
    async fn query_table<R>(&self, table: &str, params: &[(&str, String)]) -> Result<Vec<R>>
    where
        R: DeserializeOwned,
    {
        let url = self.table_url(table);
        let result: Value = self
            .retry
            .execute(|| self.send(table, self.http_client.get(&url).query(params)))
            .await?;

        let rows = match result {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            single => vec![single],
        };

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(ServiceError::from))
            .collect()
    }

    /// Create a record; attempted once
    async fn insert<T>(&self, table: &str, payload: &T, params: &[(&str, String)]) -> Result<CreatedRecord>
    where
        T: Serialize + ?Sized,
    {
        let url = self.table_url(table);
        let builder = self.http_client.post(&url).query(params).json(payload);
        let created: Value = self.send(table, builder).await?;
        self.created_record(table, &created)
    }

    /// Update a record, retrying recoverable failures
    async fn modify(&self, method: Method, table: &str, sys_id: &str, payload: &Value) -> Result<CreatedRecord> {
        let url = format!("{}/{}", self.table_url(table), sys_id);
        let updated: Value = self
            .retry
            .execute(|| self.send(table, self.http_client.request(method.clone(), &url).json(payload)))
            .await?;
        self.created_record(table, &updated)
    }

    /// Update a record with a single attempt
    async fn modify_once(&self, method: Method, table: &str, sys_id: &str, payload: &Value) -> Result<CreatedRecord> {
        let url = format!("{}/{}", self.table_url(table), sys_id);
        let builder = self.http_client.request(method, &url).json(payload);
        let updated: Value = self.send(table, builder).await?;
        self.created_record(table, &updated)
    }

    fn created_record(&self, table: &str, record: &Value) -> Result<CreatedRecord> {
        let field = |name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);

        let sys_id = field("sys_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::parsing(format!("{} response carried no sys_id", table)))?;
        let number = field("number").unwrap_or_default();

        Ok(CreatedRecord {
            target_link: browse_link(&self.base_url, table, &sys_id),
            number,
            sys_id,
        })
    }
}

#[async_trait]
impl CmdbApi for ServiceNowClient {
    async fn find_configuration_items(&self, name_or_ip: &str) -> Result<Vec<ConfigurationItem>> {
        let needle = name_or_ip.trim();
        if needle.is_empty() {
            return Err(ServiceError::validation("Configuration item name or IP is empty"));
        }

        let needle = escape_query_value(needle);
        let params = [
            ("sysparm_query", format!("nameLIKE{}^ORip_address={}", needle, needle)),
            ("sysparm_fields", CI_FIELDS.to_string()),
            ("sysparm_display_value", "true".to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        self.query_table("cmdb_ci", &params).await
    }

    async fn get_ci_relationships(&self, ci_sys_id: &str) -> Result<Vec<RelationshipEdge>> {
        let ci_sys_id = escape_query_value(ci_sys_id);
        let params = [
            ("sysparm_query", format!("parent={}^ORchild={}", ci_sys_id, ci_sys_id)),
            ("sysparm_fields", RELATIONSHIP_FIELDS.to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        self.query_table("cmdb_rel_ci", &params).await
    }
}

#[async_trait]
impl TicketingApi for ServiceNowClient {
    async fn get_change_request(&self, number: &str) -> Result<ChangeRequest> {
        let number = number.trim().to_uppercase();
        let changes = self
            .get_change_requests(None, vec![Condition::eq("number", number.as_str())])
            .await?;

        changes
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(format!("Change request {} not found", number)))
    }

    async fn get_change_requests(
        &self,
        window: Option<TimeWindow>,
        conditions: Vec<Condition>,
    ) -> Result<Vec<ChangeRequest>> {
        let window_query = match window {
            Some(window) => match window.encode("start_date")? {
                Some(encoded) => encoded,
                None => return Ok(Vec::new()),
            },
            None => String::new(),
        };

        let query = join_query([window_query, encode_conditions(&conditions)]);
        if query.is_empty() {
            debug!("Unbounded change request query skipped");
            return Ok(Vec::new());
        }

        let params = [
            ("sysparm_query", query),
            ("sysparm_fields", CHANGE_FIELDS.to_string()),
            ("sysparm_display_value", "true".to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        let mut changes: Vec<ChangeRequest> = self.query_table("change_request", &params).await?;
        for change in &mut changes {
            change.change_request_link = browse_link(&self.base_url, "change_request", &change.sys_id);
        }
        Ok(changes)
    }

    async fn get_change_tasks(&self, change_sys_id: &str) -> Result<Vec<ChangeTaskSummary>> {
        let params = [
            ("sysparm_query", format!("change_request={}", escape_query_value(change_sys_id))),
            ("sysparm_fields", CHANGE_TASK_FIELDS.to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        self.query_table("change_task", &params).await
    }

    async fn create_change_request(&self, change: &NewChangeRequest) -> Result<CreatedRecord> {
        let created = self.insert("change_request", change, &[]).await?;
        info!("Created change request {} ({})", created.number, created.sys_id);
        Ok(created)
    }

    async fn create_change_task(&self, task: &NewChangeTask) -> Result<CreatedRecord> {
        let created = self.insert("change_task", task, &[]).await?;
        info!("Created change task {} under {}", created.number, task.change_request);
        Ok(created)
    }

    async fn attach_file(
        &self,
        table: &str,
        record_sys_id: &str,
        file_name: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<AttachmentRecord> {
        let url = format!("{}/api/now/attachment/file", self.base_url);
        let builder = self
            .http_client
            .post(&url)
            .query(&[
                ("table_name", table),
                ("table_sys_id", record_sys_id),
                ("file_name", file_name),
            ])
            .header(header::CONTENT_TYPE, content_type)
            .body(content);

        let attachment: AttachmentRecord = self.send("attachment", builder).await?;
        info!("Attached {} to {} {}", file_name, table, record_sys_id);
        Ok(attachment)
    }

    async fn get_tickets(
        &self,
        table: &str,
        window: Option<TimeWindow>,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Ticket>> {
        let scope = match window {
            Some(window) => match window.encode("sys_created_on")? {
                Some(encoded) => encoded,
                None => return Ok(Vec::new()),
            },
            None => "stateNOT IN6,7".to_string(),
        };

        let params = [
            ("sysparm_query", join_query([scope, encode_conditions(&conditions)])),
            ("sysparm_fields", TICKET_FIELDS.to_string()),
            ("sysparm_display_value", "true".to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        let mut tickets: Vec<Ticket> = self.query_table(table, &params).await?;
        for ticket in &mut tickets {
            ticket.ticket_link = browse_link(&self.base_url, table, &ticket.sys_id);
        }
        Ok(tickets)
    }

    async fn update_ticket(&self, table: &str, sys_id: &str, update: &TicketUpdate) -> Result<CreatedRecord> {
        let payload = update.to_payload();
        if payload.is_empty() {
            return Err(ServiceError::validation("Ticket update carries no fields"));
        }
        let payload = Value::Object(payload);
        if update.appends_journal() {
            self.modify_once(Method::PUT, table, sys_id, &payload).await
        } else {
            self.modify(Method::PUT, table, sys_id, &payload).await
        }
    }

    async fn get_knowledge_articles(&self, conditions: Vec<Condition>) -> Result<Vec<KnowledgeArticle>> {
        let params = [
            ("sysparm_query", encode_conditions(&conditions)),
            ("sysparm_fields", KB_FIELDS.to_string()),
            ("sysparm_display_value", "true".to_string()),
            ("sysparm_exclude_reference_link", "true".to_string()),
        ];
        let mut articles: Vec<KnowledgeArticle> = self.query_table("kb_knowledge", &params).await?;
        for article in &mut articles {
            article.kb_link = kb_view_link(&self.base_url, &article.sys_id);
        }
        Ok(articles)
    }

    async fn create_knowledge_article(&self, short_description: &str, text: &str) -> Result<CreatedRecord> {
        let payload = json!({
            "short_description": short_description,
            "text": text,
            "kb_knowledge_base": "IT",
            "workflow_state": "draft",
        });
        let params = [("sysparm_input_display_value", "true".to_string())];
        self.insert("kb_knowledge", &payload, &params).await
    }

    async fn update_knowledge_article(&self, sys_id: &str, text: &str) -> Result<CreatedRecord> {
        self.modify(Method::PATCH, "kb_knowledge", sys_id, &json!({ "text": text }))
            .await
    }
}

/// Builder for [`ServiceNowClient`]
#[derive(Default)]
pub struct ServiceNowClientBuilder {
    base_url: Option<String>,
    secret_path: Option<String>,
    secrets: Option<Arc<dyn SecretStore>>,
    timeout: Option<Duration>,
    retry_config: Option<RetryConfig>,
}

impl ServiceNowClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance URL; trailing slashes are dropped
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn secret_path(mut self, path: impl Into<String>) -> Self {
        self.secret_path = Some(path.into());
        self
    }

    pub fn secrets(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(store);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn build(self) -> Result<ServiceNowClient> {
        let base_url = self
            .base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ServiceError::configuration("ServiceNow base URL is required"))?;
        let secrets = self
            .secrets
            .ok_or_else(|| ServiceError::configuration("A secret store is required"))?;

        Ok(ServiceNowClient {
            http_client: build_http_client(self.timeout.unwrap_or(Duration::from_secs(30)))?,
            base_url,
            secret_path: self.secret_path.unwrap_or_else(|| "servicenow".to_string()),
            secrets,
            retry: RetryExecutor::new(self.retry_config.unwrap_or_default()),
        })
    }
}
