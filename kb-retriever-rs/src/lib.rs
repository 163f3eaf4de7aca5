//! Relevance retrieval over historical change records and knowledge articles.
//!
//! A [`RelevanceRetriever`] ranks stored documents against free text and
//! returns the top-k with similarity scores in `[0, 1]`. Callers apply their
//! own cut-off with [`filter_relevant`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod memory;
mod text;

pub use http::HttpRetriever;
pub use memory::InMemoryRetriever;

/// Metadata key naming the record a document was rendered from
pub const SOURCE_KEY: &str = "source";

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Stored text plus free-form metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.insert(SOURCE_KEY.to_string(), source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved document and its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[async_trait]
pub trait RelevanceRetriever: Send + Sync {
    /// Top `k` documents by descending similarity
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrieverError>;
}

/// Stores that accept new documents
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Returns the number of documents written
    async fn insert_documents(&self, documents: Vec<Document>) -> Result<usize, RetrieverError>;
}

/// Keep documents scoring at or above `threshold`, preserving order
pub fn filter_relevant(documents: Vec<ScoredDocument>, threshold: f32) -> Vec<ScoredDocument> {
    documents.into_iter().filter(|d| d.score >= threshold).collect()
}

/// Join document contents into one context blob
pub fn concat_contents(documents: &[ScoredDocument]) -> String {
    documents
        .iter()
        .map(|d| d.document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
