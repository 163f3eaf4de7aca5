// kb-retriever-rs/src/memory.rs
// Process-local document store ranked by bag-of-words cosine similarity

use std::cmp::Ordering;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::text::TermVector;
use crate::{Document, DocumentSink, RelevanceRetriever, RetrieverError, ScoredDocument};

struct IndexedDocument {
    document: Document,
    terms: TermVector,
}

/// In-memory retriever used when no external search service is configured.
///
/// Documents carrying a `source` metadata entry replace any earlier document
/// with the same source, so re-indexing a record does not duplicate it.
#[derive(Default)]
pub struct InMemoryRetriever {
    entries: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        store.upsert(documents).await;
        store
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn upsert(&self, documents: Vec<Document>) -> usize {
        let mut entries = self.entries.write().await;
        let mut written = 0;

        for document in documents {
            let indexed = IndexedDocument {
                terms: TermVector::from_text(&document.content),
                document,
            };

            let existing = indexed.document.source().and_then(|source| {
                entries
                    .iter()
                    .position(|e| e.document.source() == Some(source))
            });

            match existing {
                Some(pos) => entries[pos] = indexed,
                None => entries.push(indexed),
            }
            written += 1;
        }

        written
    }
}

#[async_trait]
impl RelevanceRetriever for InMemoryRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrieverError> {
        if query.trim().is_empty() {
            return Err(RetrieverError::InvalidQuery("query text is empty".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_terms = TermVector::from_text(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut results: Vec<ScoredDocument> = entries
            .iter()
            .map(|entry| ScoredDocument {
                document: entry.document.clone(),
                score: query_terms.cosine(&entry.terms),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(k);

        debug!("In-memory search returned {} of {} documents", results.len(), entries.len());
        Ok(results)
    }
}

#[async_trait]
impl DocumentSink for InMemoryRetriever {
    async fn insert_documents(&self, documents: Vec<Document>) -> Result<usize, RetrieverError> {
        Ok(self.upsert(documents).await)
    }
}
