//! HTTP surface of the change-assist services.
//!
//! Workflow routes live under `/api/{version}`, take a JSON body and answer
//! with the envelope defined in [`response`].

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use change_engine::{
    ChangeIndexer, ChangeSubmission, DecompositionEngine, DraftRequest, DraftingOrchestrator,
    EngineSettings, KnowledgeAssistant, ServiceMapBuilder,
};
use itsm_client::{CmdbApi, Condition, TicketUpdate, TicketingApi, TimeWindow};
use kb_retriever::{DocumentSink, RelevanceRetriever};
use llm_gateway::TextGenerator;

pub mod response;

use response::{json_body, success, ApiError};

/// Upper bound on request bodies, uploads included
pub const MAX_PAYLOAD_SIZE: usize = 25 * 1024 * 1024;

pub const SERVICE_NAME: &str = "api-gateway";

/// Workflow routes, each mounted as `POST /api/{version}/{name}`
pub const API_ROUTES: &[&str] = &[
    "create_ctask_for_change_request",
    "draft_change_prompt",
    "create_change_with_impact",
    "get_dependancy_views",
    "get_cmdb_ci_details",
    "get_change_request_details",
    "get_ticket_details",
    "update_ticket_details",
    "get_kb_articles_details",
    "create_knowledge_article",
    "update_knowledge_article",
    "get_contextual_response",
    "index_change_requests",
    "index_kb_articles",
];

const DEFAULT_TICKET_TABLE: &str = "incident";

/// Collaborators the gateway wires into the workflows
#[derive(Clone)]
pub struct Backends {
    pub cmdb: Arc<dyn CmdbApi>,
    pub ticketing: Arc<dyn TicketingApi>,
    pub retriever: Arc<dyn RelevanceRetriever>,
    pub documents: Arc<dyn DocumentSink>,
    /// Knowledge article index, kept apart from change history
    pub articles: Arc<dyn RelevanceRetriever>,
    pub article_sink: Arc<dyn DocumentSink>,
    pub generator: Arc<dyn TextGenerator>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: u64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeNumberBody {
    #[serde(default)]
    pub chg_number: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfigItemBody {
    #[serde(default)]
    pub config_item: String,
}

#[derive(Debug, Deserialize)]
pub struct ConditionsBody {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleUpdateBody {
    #[serde(default)]
    pub sys_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketQueryBody {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub start_ts: String,
    #[serde(default)]
    pub end_ts: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
pub struct TicketUpdateBody {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub sys_id: String,
    #[serde(flatten)]
    pub update: TicketUpdate,
}

#[derive(Debug, Deserialize)]
pub struct NewArticleBody {
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexChangesBody {
    #[serde(default)]
    pub chg_numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChangeBody {
    #[serde(default)]
    pub uploaded_files: String,
    #[serde(default)]
    pub config_items: String,
    pub change: ChangeSubmission,
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Table name for the ticket routes, defaulting to incidents
fn ticket_table(value: &str) -> Result<String, ApiError> {
    let table = value.trim();
    if table.is_empty() {
        return Ok(DEFAULT_TICKET_TABLE.to_string());
    }
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::validation(format!("Invalid table name '{}'", table)));
    }
    Ok(table.to_string())
}

/// Both bounds or neither; a lone bound is rejected
fn ticket_window(start: &str, end: &str) -> Result<Option<TimeWindow>, ApiError> {
    match (start.trim(), end.trim()) {
        ("", "") => Ok(None),
        ("", _) | (_, "") => Err(ApiError::validation("start_ts and end_ts must be given together")),
        (start, end) => Ok(Some(TimeWindow::new(start, end))),
    }
}

/// Gateway state: the workflows plus direct ticketing access for lookups
pub struct ApiGateway {
    started: Instant,
    version: String,
    cmdb: Arc<dyn CmdbApi>,
    ticketing: Arc<dyn TicketingApi>,
    service_maps: ServiceMapBuilder,
    decomposer: DecompositionEngine,
    drafter: DraftingOrchestrator,
    indexer: ChangeIndexer,
    knowledge: KnowledgeAssistant,
}

impl ApiGateway {
    pub fn new(backends: Backends, settings: EngineSettings) -> Self {
        let Backends {
            cmdb,
            ticketing,
            retriever,
            documents,
            articles,
            article_sink,
            generator,
        } = backends;

        Self {
            started: Instant::now(),
            version: "v1".to_string(),
            service_maps: ServiceMapBuilder::with_settings(cmdb.clone(), &settings),
            decomposer: DecompositionEngine::new(
                ticketing.clone(),
                retriever.clone(),
                generator.clone(),
                settings.clone(),
            ),
            drafter: DraftingOrchestrator::new(
                ticketing.clone(),
                retriever,
                generator.clone(),
                ServiceMapBuilder::with_settings(cmdb.clone(), &settings),
                settings.clone(),
            ),
            indexer: ChangeIndexer::new(ticketing.clone(), documents, &settings),
            knowledge: KnowledgeAssistant::new(ticketing.clone(), articles, article_sink, generator, settings),
            cmdb,
            ticketing,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Create the Axum router with all routes and middleware
    pub fn create_router(self: Arc<Self>) -> Router {
        let api = Router::new()
            .route("/create_ctask_for_change_request", post(Self::create_ctask_handler))
            .route("/draft_change_prompt", post(Self::draft_change_handler))
            .route("/create_change_with_impact", post(Self::create_change_handler))
            .route("/get_dependancy_views", post(Self::dependency_views_handler))
            .route("/get_cmdb_ci_details", post(Self::ci_details_handler))
            .route("/get_change_request_details", post(Self::change_details_handler))
            .route("/get_ticket_details", post(Self::ticket_details_handler))
            .route("/update_ticket_details", post(Self::update_ticket_handler))
            .route("/get_kb_articles_details", post(Self::kb_articles_handler))
            .route("/create_knowledge_article", post(Self::create_article_handler))
            .route("/update_knowledge_article", post(Self::update_article_handler))
            .route("/get_contextual_response", post(Self::contextual_response_handler))
            .route("/index_change_requests", post(Self::index_changes_handler))
            .route("/index_kb_articles", post(Self::index_articles_handler));

        Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .nest(&format!("/api/{}", self.version), api)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    async fn root_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        let mut endpoints = vec!["GET /health".to_string()];
        endpoints.extend(
            API_ROUTES
                .iter()
                .map(|name| format!("POST /api/{}/{}", state.version, name)),
        );
        Json(json!({
            "service": "ITSM Change Assist API Gateway",
            "version": state.version,
            "endpoints": endpoints
        }))
    }

    async fn health_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        Json(HealthResponse {
            healthy: true,
            service_name: SERVICE_NAME.to_string(),
            uptime_seconds: state.started.elapsed().as_secs(),
            status: "SERVING".to_string(),
        })
    }

    async fn create_ctask_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ChangeNumberBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let number = required("chg_number", &body.chg_number)?;
        tracing::info!("Decomposing change {}", number);

        let report = state.decomposer.decompose(&number).await?;
        let message = format!(
            "Created {} of {} change tasks for {}",
            report.created().count(),
            report.outcomes.len(),
            report.change_number
        );
        Ok(success(report, message))
    }

    async fn draft_change_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<DraftRequest>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let request = json_body(payload)?;
        if request.uploaded_files.trim().is_empty() && request.config_items.trim().is_empty() {
            return Err(ApiError::validation(
                "uploaded_files or config_items is required",
            ));
        }

        let outcome = state.drafter.draft(&request).await?;
        Ok(success(outcome, "Change drafted"))
    }

    async fn create_change_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<CreateChangeBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let created = state
            .drafter
            .create_with_impact(&body.uploaded_files, &body.config_items, &body.change)
            .await?;

        let message = format!("Change {} created", created.change_number);
        Ok(success(created, message))
    }

    async fn dependency_views_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ConfigItemBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let ci = required("config_item", &body.config_item)?;

        let mapped = state.service_maps.analyze_ci(&ci).await?;
        let narrative = mapped.service_map.explain(&ci);
        let lines: Vec<&str> = mapped.service_map.lines().collect();
        let data = json!({
            "configuration_item": mapped.configuration_item,
            "relationships": lines,
            "truncated": mapped.service_map.truncated,
            "service_map": narrative,
        });
        Ok(success(data, format!("Service map for {}", ci)))
    }

    async fn ci_details_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ConfigItemBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let ci = required("config_item", &body.config_item)?;

        let items = state.cmdb.find_configuration_items(&ci).await?;
        let message = format!("{} configuration items found", items.len());
        Ok(success(items, message))
    }

    async fn change_details_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ConditionsBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let changes = state.ticketing.get_change_requests(None, body.conditions).await?;
        let message = format!("{} change requests found", changes.len());
        Ok(success(changes, message))
    }

    async fn ticket_details_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<TicketQueryBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let table = ticket_table(&body.table)?;
        let window = ticket_window(&body.start_ts, &body.end_ts)?;

        let tickets = state.ticketing.get_tickets(&table, window, body.conditions).await?;
        let message = format!("{} {} records found", tickets.len(), table);
        Ok(success(tickets, message))
    }

    async fn update_ticket_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<TicketUpdateBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let table = ticket_table(&body.table)?;
        let sys_id = required("sys_id", &body.sys_id)?;

        let updated = state.ticketing.update_ticket(&table, &sys_id, &body.update).await?;
        let message = format!("{} {} updated", table, updated.number);
        Ok(success(updated, message))
    }

    async fn kb_articles_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ConditionsBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let articles = state.ticketing.get_knowledge_articles(body.conditions).await?;
        let message = format!("{} knowledge articles found", articles.len());
        Ok(success(articles, message))
    }

    async fn create_article_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<NewArticleBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let title = required("short_description", &body.short_description)?;

        let created = state.knowledge.publish_article(&title, &body.text).await?;
        let message = format!("Knowledge article {} created", created.number);
        Ok(success(created, message))
    }

    async fn update_article_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ArticleUpdateBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let sys_id = required("sys_id", &body.sys_id)?;

        let updated = state
            .ticketing
            .update_knowledge_article(&sys_id, &body.text)
            .await?;
        let message = format!("Knowledge article {} updated", updated.number);
        Ok(success(updated, message))
    }

    async fn index_changes_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<IndexChangesBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        if body.chg_numbers.is_empty() {
            return Err(ApiError::validation("chg_numbers is required"));
        }

        let report = state.indexer.index_changes(&body.chg_numbers).await?;
        let message = format!("Indexed {} change requests", report.indexed.len());
        Ok(success(report, message))
    }

    async fn contextual_response_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<QueryBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let query = required("query", &body.query)?;

        let answer = state.knowledge.contextual_response(&query).await?;
        Ok(success(answer, "Contextual response retrieved successfully."))
    }

    async fn index_articles_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<ConditionsBody>, JsonRejection>,
    ) -> Result<impl IntoResponse, ApiError> {
        let body = json_body(payload)?;
        let report = state.knowledge.index_articles(body.conditions).await?;
        let message = format!("Indexed {} knowledge articles", report.indexed.len());
        Ok(success(report, message))
    }
}
