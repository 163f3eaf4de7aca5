//! Historical change records: lookup for prompt context and indexing into
//! the document store.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use itsm_client::{ChangeRequest, ChangeTaskSummary, TicketingApi};
use kb_retriever::{filter_relevant, Document, DocumentSink, RelevanceRetriever, ScoredDocument};

use crate::error::{bounded, EngineError, Result};
use crate::settings::EngineSettings;

/// Top-k search cut down to documents at or above `threshold`
pub(crate) async fn relevant_history(
    retriever: &dyn RelevanceRetriever,
    query: &str,
    settings: &EngineSettings,
) -> Result<Vec<ScoredDocument>> {
    let found = bounded(
        settings.call_timeout,
        "similarity search",
        retriever.search(query, settings.top_k),
    )
    .await?;

    let total = found.len();
    let kept = filter_relevant(found, settings.similarity_threshold);
    info!(
        "Retrieved {} similar records, {} at or above {:.2}",
        total,
        kept.len(),
        settings.similarity_threshold
    );
    Ok(kept)
}

/// Knowledge document for one change and its tasks
pub fn render_change_document(change: &ChangeRequest, tasks: &[ChangeTaskSummary]) -> Document {
    let mut content = format!(
        "Change Request Number - {}\n\n\
         Short Description - {}\n\n\
         Description - \n{}\n\n\
         Assignment Group -\n{}\n\n\
         Implementation Plan -\n{}\n\n\
         Backout Plan -\n{}\n\n\
         Test Plan -\n{}\n\n",
        change.number,
        change.short_description,
        change.description,
        change.assignment_group,
        change.implementation_plan,
        change.backout_plan,
        change.test_plan
    );

    for task in tasks {
        content.push_str(&format!(
            "C-Tasks - {}\n Short Description - {}\n Assignment Group - {}\n ",
            task.number, task.short_description, task.assignment_group
        ));
    }

    Document::new(content).with_source(change.number.clone())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    pub indexed: Vec<String>,
    /// Numbers with no matching change
    pub skipped: Vec<String>,
}

pub struct ChangeIndexer {
    ticketing: Arc<dyn TicketingApi>,
    sink: Arc<dyn DocumentSink>,
    call_timeout: Duration,
}

impl ChangeIndexer {
    pub fn new(ticketing: Arc<dyn TicketingApi>, sink: Arc<dyn DocumentSink>, settings: &EngineSettings) -> Self {
        Self {
            ticketing,
            sink,
            call_timeout: settings.call_timeout,
        }
    }

    pub async fn index_changes(&self, numbers: &[String]) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let mut documents = Vec::new();

        for raw in numbers {
            let number = raw.trim().to_uppercase();
            if number.is_empty() {
                continue;
            }

            let change = match bounded(
                self.call_timeout,
                "change lookup",
                self.ticketing.get_change_request(&number),
            )
            .await
            {
                Ok(change) => change,
                Err(EngineError::NotFound(_)) => {
                    warn!("Change {} not found, not indexed", number);
                    report.skipped.push(number);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let tasks = bounded(
                self.call_timeout,
                "change task lookup",
                self.ticketing.get_change_tasks(&change.sys_id),
            )
            .await?;

            documents.push(render_change_document(&change, &tasks));
            report.indexed.push(change.number);
        }

        if !documents.is_empty() {
            let written = self.sink.insert_documents(documents).await?;
            info!("Indexed {} change documents", written);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_change_document() {
        let change = ChangeRequest {
            number: "CHG0030001".into(),
            short_description: "Patch web tier".into(),
            description: "Monthly patching".into(),
            assignment_group: "Web Ops".into(),
            implementation_plan: "drain; patch".into(),
            backout_plan: "restore".into(),
            test_plan: "smoke".into(),
            ..ChangeRequest::default()
        };
        let tasks = vec![ChangeTaskSummary {
            number: "CTASK0010001".into(),
            short_description: "Drain pool".into(),
            assignment_group: "Web Ops".into(),
        }];

        let doc = render_change_document(&change, &tasks);
        assert_eq!(doc.source(), Some("CHG0030001"));
        assert!(doc.content.starts_with("Change Request Number - CHG0030001\n\nShort Description - Patch web tier"));
        assert!(doc.content.contains("Test Plan -\nsmoke\n\nC-Tasks - CTASK0010001\n Short Description - Drain pool\n"));
    }
}
