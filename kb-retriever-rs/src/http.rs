// kb-retriever-rs/src/http.rs
// Client for an external similarity-search service

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Document, DocumentSink, RelevanceRetriever, RetrieverError, ScoredDocument};

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    content: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
    score: f32,
}

#[derive(Serialize)]
struct InsertRequest<'a> {
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct InsertResponse {
    inserted: usize,
}

/// Retriever backed by `POST {base}/search` and `POST {base}/documents`
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    base_url: String,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RetrieverError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrieverError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, RetrieverError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RetrieverError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Search service returned {} for {}: {}", status, url, text);
            return Err(RetrieverError::Transport(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl RelevanceRetriever for HttpRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrieverError> {
        if query.trim().is_empty() {
            return Err(RetrieverError::InvalidQuery("query text is empty".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let response: SearchResponse = self.post("search", &SearchRequest { query, k }).await?;
        debug!("Search service returned {} hits", response.results.len());

        Ok(response
            .results
            .into_iter()
            .take(k)
            .map(|hit| ScoredDocument {
                document: Document {
                    content: hit.content,
                    metadata: hit.metadata,
                },
                score: hit.score.clamp(0.0, 1.0),
            })
            .collect())
    }
}

#[async_trait]
impl DocumentSink for HttpRetriever {
    async fn insert_documents(&self, documents: Vec<Document>) -> Result<usize, RetrieverError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let response: InsertResponse = self
            .post("documents", &InsertRequest { documents: &documents })
            .await?;
        Ok(response.inserted)
    }
}
