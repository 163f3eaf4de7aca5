//! Knowledge assistant: answers built from indexed knowledge articles.
//!
//! A question is matched against the article index. Matching chunks are
//! grouped by article number and summarized with the numbers cited; when
//! nothing relevant is indexed the model writes a step-by-step article
//! instead.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use itsm_client::{Condition, CreatedRecord, KnowledgeArticle, TicketingApi};
use kb_retriever::{Document, DocumentSink, RelevanceRetriever, ScoredDocument};
use llm_gateway::{ChatMessage, TextGenerator};

use crate::error::{bounded, EngineError, Result};
use crate::history::{relevant_history, IndexReport};
use crate::prompts;
use crate::settings::EngineSettings;

pub const REFERENCE_HEADER: &str = "Reference KB Articles - \n";
pub const NO_ARTICLES_NOTICE: &str =
    "No relevant knowledge articles found in repository. However, you can try below solution - \n\n";

const UNNUMBERED: &str = "Unnumbered article";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextualAnswer {
    /// Article numbers the answer draws on, in retrieval order
    pub articles: Vec<String>,
    /// Reference header followed by the generated text
    pub response: String,
}

/// Chunk contents concatenated per article, first-seen order
pub fn group_by_article(documents: &[ScoredDocument]) -> Vec<(String, String)> {
    let mut grouped: Vec<(String, String)> = Vec::new();
    for scored in documents {
        let number = scored.document.source().unwrap_or(UNNUMBERED);
        match grouped.iter_mut().find(|(seen, _)| seen == number) {
            Some((_, content)) => content.push_str(&scored.document.content),
            None => grouped.push((number.to_string(), scored.document.content.clone())),
        }
    }
    grouped
}

/// Article body with markup removed and whitespace collapsed
pub fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Index document for one article, keyed by its number
pub fn render_article_document(article: &KnowledgeArticle) -> Document {
    let content = format!(
        "Article Number - {}\n\nShort Description - {}\n\n{}",
        article.number,
        article.short_description,
        plain_text(&article.text)
    );
    Document::new(content).with_source(article.number.clone())
}

pub struct KnowledgeAssistant {
    ticketing: Arc<dyn TicketingApi>,
    articles: Arc<dyn RelevanceRetriever>,
    sink: Arc<dyn DocumentSink>,
    generator: Arc<dyn TextGenerator>,
    settings: EngineSettings,
}

impl KnowledgeAssistant {
    pub fn new(
        ticketing: Arc<dyn TicketingApi>,
        articles: Arc<dyn RelevanceRetriever>,
        sink: Arc<dyn DocumentSink>,
        generator: Arc<dyn TextGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ticketing,
            articles,
            sink,
            generator,
            settings,
        }
    }

    pub async fn contextual_response(&self, query: &str) -> Result<ContextualAnswer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::Validation("query is empty".to_string()));
        }

        let relevant = relevant_history(self.articles.as_ref(), query, &self.settings).await?;
        let grouped = group_by_article(&relevant);

        let mut response = String::from(REFERENCE_HEADER);
        let messages = if grouped.is_empty() {
            info!("No indexed article matches, drafting a fresh solution");
            response.push_str(NO_ARTICLES_NOTICE);
            vec![
                ChatMessage::system(prompts::KB_AUTHOR_ROLE),
                ChatMessage::user(query),
            ]
        } else {
            for (number, _) in &grouped {
                response.push_str(number);
                response.push('\n');
            }
            response.push_str("\n\n");
            vec![
                ChatMessage::system(prompts::KB_SUMMARY_ROLE),
                ChatMessage::user(prompts::kb_summary_request(&grouped, query)),
            ]
        };

        let summary = bounded(
            self.settings.call_timeout,
            "knowledge summary",
            self.generator.generate(messages),
        )
        .await?;
        response.push_str(&summary);

        Ok(ContextualAnswer {
            articles: grouped.into_iter().map(|(number, _)| number).collect(),
            response,
        })
    }

    /// Pull matching articles from the ticketing system into the index
    pub async fn index_articles(&self, conditions: Vec<Condition>) -> Result<IndexReport> {
        let articles = bounded(
            self.settings.call_timeout,
            "knowledge article lookup",
            self.ticketing.get_knowledge_articles(conditions),
        )
        .await?;

        let mut report = IndexReport::default();
        let mut documents = Vec::new();
        for article in &articles {
            if article.number.trim().is_empty() || plain_text(&article.text).is_empty() {
                warn!("Article {} has no number or body, not indexed", article.sys_id);
                report.skipped.push(article.sys_id.clone());
                continue;
            }
            documents.push(render_article_document(article));
            report.indexed.push(article.number.clone());
        }

        if !documents.is_empty() {
            let written = self.sink.insert_documents(documents).await?;
            info!("Indexed {} knowledge articles", written);
        }
        Ok(report)
    }

    /// Create an article and make it searchable right away
    pub async fn publish_article(&self, short_description: &str, text: &str) -> Result<CreatedRecord> {
        if short_description.trim().is_empty() {
            return Err(EngineError::Validation("short_description is required".to_string()));
        }

        let created = bounded(
            self.settings.call_timeout,
            "knowledge article creation",
            self.ticketing.create_knowledge_article(short_description, text),
        )
        .await?;

        let article = KnowledgeArticle {
            sys_id: created.sys_id.clone(),
            number: created.number.clone(),
            short_description: short_description.to_string(),
            text: text.to_string(),
            ..KnowledgeArticle::default()
        };
        if let Err(e) = self.sink.insert_documents(vec![render_article_document(&article)]).await {
            warn!("Article {} created but not indexed: {}", created.number, e);
        }
        Ok(created)
    }
}
