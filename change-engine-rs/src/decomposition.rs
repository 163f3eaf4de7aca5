//! Change-to-task decomposition.
//!
//! Similar historical changes are retrieved for context, the model proposes
//! a task breakdown, JSON objects are extracted from its reply, and one change
//! task is created per object. Creations run sequentially and independently:
//! a failed creation is reported in its slot and the rest still run.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use itsm_client::{ChangeRequest, NewChangeTask, TicketingApi};
use kb_retriever::{concat_contents, RelevanceRetriever};
use llm_gateway::{ChatMessage, TextGenerator};

use crate::error::{bounded, EngineError, Result};
use crate::extraction::{extract_from_reply, ExtractedSuggestion};
use crate::history::relevant_history;
use crate::prompts;
use crate::settings::EngineSettings;

pub const DEFAULT_TASK_LABEL: &str = "Change Task Creation";
pub const TASK_PRIORITY: &str = "5 - Planning";

/// Result of one suggestion's creation attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Created {
        index: usize,
        number: String,
        target_link: String,
    },
    Failed {
        index: usize,
        reason: String,
    },
    /// The extracted object lacked a required key
    Skipped {
        index: usize,
        missing_key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionReport {
    pub change_number: String,
    pub outcomes: Vec<TaskOutcome>,
    /// Set when extraction stopped at a malformed object
    pub extraction_error: Option<String>,
}

impl DecompositionReport {
    pub fn created(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Created { .. }))
    }
}

/// Build the task payload, substituting a default label for an empty title
pub fn task_from_suggestion(suggestion: ExtractedSuggestion, change_sys_id: &str) -> NewChangeTask {
    let (short_description, description) = if suggestion.short_description.trim().is_empty() {
        (DEFAULT_TASK_LABEL.to_string(), String::new())
    } else {
        (suggestion.short_description, suggestion.description)
    };

    NewChangeTask {
        short_description,
        description,
        assignment_group: suggestion.assignment_group,
        change_request: change_sys_id.to_string(),
        priority: TASK_PRIORITY.to_string(),
    }
}

pub struct DecompositionEngine {
    ticketing: Arc<dyn TicketingApi>,
    retriever: Arc<dyn RelevanceRetriever>,
    generator: Arc<dyn TextGenerator>,
    settings: EngineSettings,
}

impl DecompositionEngine {
    pub fn new(
        ticketing: Arc<dyn TicketingApi>,
        retriever: Arc<dyn RelevanceRetriever>,
        generator: Arc<dyn TextGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ticketing,
            retriever,
            generator,
            settings,
        }
    }

    pub async fn decompose(&self, change_number: &str) -> Result<DecompositionReport> {
        let number = change_number.trim().to_uppercase();
        if number.is_empty() {
            return Err(EngineError::Validation("change number is empty".to_string()));
        }

        let change = bounded(
            self.settings.call_timeout,
            "change lookup",
            self.ticketing.get_change_request(&number),
        )
        .await?;

        let historical = self.historical_context(&change).await?;
        let reply = self.suggest_tasks(&change, &historical).await?;

        let extraction = extract_from_reply(&reply);
        if let Some(error) = &extraction.error {
            warn!(
                "Extraction for {} stopped after {} objects: {}",
                number,
                extraction.objects.len(),
                error
            );
            if extraction.objects.is_empty() {
                return Err(EngineError::Extraction(error.clone()));
            }
        }

        let mut outcomes = Vec::with_capacity(extraction.objects.len());
        for (index, value) in extraction.objects.iter().enumerate() {
            let suggestion = match ExtractedSuggestion::from_value(value) {
                Ok(suggestion) => suggestion,
                Err(missing_key) => {
                    warn!("Suggestion {} for {} lacks '{}'", index, number, missing_key);
                    outcomes.push(TaskOutcome::Skipped {
                        index,
                        missing_key: missing_key.to_string(),
                    });
                    continue;
                }
            };

            let task = task_from_suggestion(suggestion, &change.sys_id);
            outcomes.push(self.create_task(index, &task).await);
        }

        info!(
            "Decomposed {} into {} tasks ({} suggestions)",
            number,
            outcomes
                .iter()
                .filter(|o| matches!(o, TaskOutcome::Created { .. }))
                .count(),
            outcomes.len()
        );

        Ok(DecompositionReport {
            change_number: change.number,
            outcomes,
            extraction_error: extraction.error.map(|e| e.to_string()),
        })
    }

    async fn historical_context(&self, change: &ChangeRequest) -> Result<String> {
        let query = prompts::similar_change_query(change);
        let relevant = relevant_history(self.retriever.as_ref(), &query, &self.settings).await?;
        Ok(concat_contents(&relevant))
    }

    async fn suggest_tasks(&self, change: &ChangeRequest, historical: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(prompts::ASSISTANT_ROLE),
            ChatMessage::user(prompts::task_breakdown(change, historical)),
        ];
        bounded(
            self.settings.call_timeout,
            "task suggestion",
            self.generator.generate(messages),
        )
        .await
    }

    async fn create_task(&self, index: usize, task: &NewChangeTask) -> TaskOutcome {
        let result = bounded(
            self.settings.call_timeout,
            "change task creation",
            self.ticketing.create_change_task(task),
        )
        .await;

        match result {
            Ok(created) => TaskOutcome::Created {
                index,
                number: created.number,
                target_link: created.target_link,
            },
            Err(e) => {
                warn!("Change task {} ('{}') failed: {}", index, task.short_description, e);
                TaskOutcome::Failed {
                    index,
                    reason: e.to_string(),
                }
            }
        }
    }
}
