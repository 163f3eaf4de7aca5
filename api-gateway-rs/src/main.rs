// api-gateway-rs/src/main.rs
// HTTP entry point for the change-assist workflows

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use api_gateway::{ApiGateway, Backends};
use change_engine::EngineSettings;
use config_rs::{get_bind_address, AppConfig, API_GATEWAY_DEFAULT_PORT};
use itsm_client::ServiceNowClient;
use kb_retriever::{DocumentSink, HttpRetriever, InMemoryRetriever, RelevanceRetriever};
use llm_gateway::{LlmClient, LlmClientConfig};
use secrets_client::{SecretStore, StaticSecretStore, VaultSecretStore, VaultSettings};

fn secret_store(config: &AppConfig) -> Result<Arc<dyn SecretStore>, Box<dyn std::error::Error>> {
    match &config.vault_token {
        Some(token) => {
            tracing::info!("Resolving ticketing credentials from Vault at {}", config.vault_url);
            let settings = VaultSettings::new(&config.vault_url, token, &config.vault_mount);
            Ok(Arc::new(VaultSecretStore::new(settings)?))
        }
        None => {
            tracing::warn!("VAULT_TOKEN not set - using SNOW_USERNAME/SNOW_PASSWORD");
            Ok(Arc::new(StaticSecretStore::from_env(&config.snow_tag)))
        }
    }
}

/// Search service at `url`, or a fresh in-memory index
fn index(
    url: Option<&str>,
    label: &str,
    config: &AppConfig,
) -> Result<(Arc<dyn RelevanceRetriever>, Arc<dyn DocumentSink>), Box<dyn std::error::Error>> {
    match url {
        Some(url) => {
            tracing::info!("Using search service at {} for {}", url, label);
            let retriever = Arc::new(HttpRetriever::new(url, config.request_timeout())?);
            let search: Arc<dyn RelevanceRetriever> = retriever.clone();
            let sink: Arc<dyn DocumentSink> = retriever;
            Ok((search, sink))
        }
        None => {
            tracing::info!("No search service for {} - using an in-memory index", label);
            let retriever = Arc::new(InMemoryRetriever::new());
            let search: Arc<dyn RelevanceRetriever> = retriever.clone();
            let sink: Arc<dyn DocumentSink> = retriever;
            Ok((search, sink))
        }
    }
}

fn backends(config: &AppConfig) -> Result<Backends, Box<dyn std::error::Error>> {
    let snow = Arc::new(
        ServiceNowClient::builder()
            .base_url(&config.snow_url)
            .secret_path(&config.snow_tag)
            .secrets(secret_store(config)?)
            .timeout(config.request_timeout())
            .build()?,
    );

    let llm = LlmClient::new(LlmClientConfig::from_env(&config.llm_api_url, &config.llm_model))?;
    if !llm.is_configured() {
        tracing::warn!("LLM_API_KEY not set - generation calls will fail");
    }

    let (retriever, documents) = index(config.kb_search_url.as_deref(), "change history", config)?;
    let (articles, article_sink) = index(
        config.kb_articles_search_url.as_deref(),
        "knowledge articles",
        config,
    )?;

    let backends = Backends {
        cmdb: snow.clone(),
        ticketing: snow,
        retriever,
        documents,
        articles,
        article_sink,
        generator: Arc::new(llm),
    };
    Ok(backends)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let settings = EngineSettings::from(&config);

    tracing::info!("Using ticketing instance: {}", config.snow_url);
    tracing::info!("Using model {} at {}", config.llm_model, config.llm_api_url);

    let gateway = ApiGateway::new(backends(&config)?, settings)
        .with_version(config.api_version.clone());
    let app = Arc::new(gateway).create_router();

    let addr = get_bind_address("API_GATEWAY", API_GATEWAY_DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API Gateway starting on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
