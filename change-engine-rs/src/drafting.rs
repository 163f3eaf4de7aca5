//! Draft a change from a short description, narrate its impact, and submit it.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use itsm_client::{NewChangeRequest, TicketingApi};
use kb_retriever::RelevanceRetriever;
use llm_gateway::{ChatMessage, TextGenerator};

use crate::error::{bounded, EngineError, Result};
use crate::extraction::value_to_text;
use crate::history::relevant_history;
use crate::prompts;
use crate::service_map::ServiceMapBuilder;
use crate::settings::EngineSettings;

/// Config items containing this marker are not service-mapped
pub const FIREWALL_MARKER: &str = "Firewall";

const CHANGE_TABLE: &str = "change_request";

const DRAFT_KEYS: [&str; 6] = [
    "short_description",
    "description",
    "implementation_plan",
    "backout_plan",
    "test_plan",
    "chg_model",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftRequest {
    #[serde(default)]
    pub change_title: String,
    #[serde(default)]
    pub change_purpose: String,
    #[serde(default)]
    pub os_info: String,
    /// Comma-separated names of files in the attachment directory
    #[serde(default)]
    pub uploaded_files: String,
    /// Comma-separated CI names or IPs
    #[serde(default)]
    pub config_items: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDraft {
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub implementation_plan: String,
    #[serde(default)]
    pub backout_plan: String,
    #[serde(default)]
    pub test_plan: String,
    #[serde(default)]
    pub chg_model: String,
}

impl ChangeDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        let values = [
            &self.short_description,
            &self.description,
            &self.implementation_plan,
            &self.backout_plan,
            &self.test_plan,
            &self.chg_model,
        ];
        DRAFT_KEYS
            .iter()
            .zip(values)
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftOutcome {
    pub change_details: ChangeDraft,
    pub impact_analysis: String,
}

/// A reviewed draft ready for submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeSubmission {
    #[serde(flatten)]
    pub change: ChangeDraft,
    #[serde(default)]
    pub risk_impact_analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedChange {
    pub change_number: String,
    pub change_link: String,
    pub attachments: Vec<String>,
    /// Files that could not be attached to the created change
    pub failed_attachments: Vec<String>,
}

/// Isolate the last `{...}` block of a model reply and read the draft keys from it
pub fn parse_change_draft(reply: &str) -> Result<ChangeDraft> {
    let flat: String = reply.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let tail = flat
        .rsplit_once('{')
        .map(|(_, tail)| tail)
        .ok_or_else(|| EngineError::DraftParse("reply contains no JSON object".to_string()))?;
    let body = tail.split('}').next().unwrap_or_default().trim();

    let object: Map<String, Value> = serde_json::from_str(&format!("{{{}}}", body))
        .map_err(|e| EngineError::DraftParse(e.to_string()))?;

    let field = |key: &str| -> Result<String> {
        object
            .get(key)
            .map(value_to_text)
            .ok_or_else(|| EngineError::DraftParse(format!("reply is missing '{}'", key)))
    };

    Ok(ChangeDraft {
        short_description: field("short_description")?,
        description: field("description")?,
        implementation_plan: field("implementation_plan")?,
        backout_plan: field("backout_plan")?,
        test_plan: field("test_plan")?,
        chg_model: field("chg_model")?,
    })
}

/// Final path component with anything outside `[A-Za-z0-9._-]` replaced by `_`
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.trim().rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}

pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

struct Attachment {
    file_name: String,
    content_type: &'static str,
    content: Vec<u8>,
}

pub struct DraftingOrchestrator {
    ticketing: Arc<dyn TicketingApi>,
    retriever: Arc<dyn RelevanceRetriever>,
    generator: Arc<dyn TextGenerator>,
    service_maps: ServiceMapBuilder,
    settings: EngineSettings,
}

impl DraftingOrchestrator {
    pub fn new(
        ticketing: Arc<dyn TicketingApi>,
        retriever: Arc<dyn RelevanceRetriever>,
        generator: Arc<dyn TextGenerator>,
        service_maps: ServiceMapBuilder,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ticketing,
            retriever,
            generator,
            service_maps,
            settings,
        }
    }

    async fn ask(&self, what: &str, prompt: String) -> Result<String> {
        let messages = vec![ChatMessage::system(prompts::ASSISTANT_ROLE), ChatMessage::user(prompt)];
        bounded(self.settings.call_timeout, what, self.generator.generate(messages)).await
    }

    pub async fn draft(&self, request: &DraftRequest) -> Result<DraftOutcome> {
        if request.change_title.trim().is_empty() && request.change_purpose.trim().is_empty() {
            return Err(EngineError::Validation(
                "a change title or a change purpose is required".to_string(),
            ));
        }

        let brief_prompt = prompts::change_brief(
            &request.change_title,
            &request.change_purpose,
            &request.config_items,
            &request.os_info,
        );
        let brief = prompts::finish_brief(&self.ask("change brief", brief_prompt).await?);

        let history = relevant_history(self.retriever.as_ref(), &brief, &self.settings).await?;
        let requirement = prompts::refined_requirement(&brief, &history);

        let reply = self
            .ask("change draft", prompts::change_document_request(&requirement))
            .await?;
        let change_details = parse_change_draft(&reply)?;
        info!("Drafted change '{}'", change_details.short_description);

        let mut sections = Vec::new();

        let config_items = request.config_items.trim();
        if !config_items.is_empty() && !config_items.contains(FIREWALL_MARKER) {
            let narrative = self.impact_from_service_maps(&change_details, config_items).await?;
            if !narrative.trim().is_empty() {
                sections.push(narrative);
            }
        }

        if !request.uploaded_files.trim().is_empty() {
            let narrative = self
                .impact_from_diagrams(&change_details, &request.uploaded_files)
                .await?;
            if !narrative.trim().is_empty() {
                sections.push(narrative);
            }
        }

        Ok(DraftOutcome {
            change_details,
            impact_analysis: sections.join("\n\n"),
        })
    }

    async fn impact_from_service_maps(&self, change: &ChangeDraft, config_items: &str) -> Result<String> {
        let mut explanations = Vec::new();

        for ci in split_list(config_items) {
            match self.service_maps.analyze_ci(ci).await {
                Ok(mapped) => explanations.push(mapped.service_map.explain(ci)),
                Err(EngineError::NotFound(msg)) => warn!("Skipping impact analysis for {}: {}", ci, msg),
                Err(e) => return Err(e),
            }
        }

        if explanations.is_empty() {
            return Ok(String::new());
        }

        let prompt = prompts::service_map_impact(&explanations, &change.short_description, &change.description);
        self.ask("service map impact", prompt).await
    }

    async fn impact_from_diagrams(&self, change: &ChangeDraft, uploaded_files: &str) -> Result<String> {
        let prompt = prompts::diagram_impact(&change.short_description, &change.description);
        let mut narratives = Vec::new();

        for attachment in self.load_attachments(uploaded_files).await? {
            if !attachment.content_type.starts_with("image/") {
                warn!("{} is not an image, skipping diagram analysis", attachment.file_name);
                continue;
            }
            let narrative = bounded(
                self.settings.call_timeout,
                "diagram impact",
                self.generator
                    .generate_with_image(&prompt, &attachment.content, attachment.content_type),
            )
            .await?;
            narratives.push(narrative);
        }

        Ok(narratives.join("\n\n"))
    }

    async fn load_attachments(&self, uploaded_files: &str) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::new();
        for raw in split_list(uploaded_files) {
            let file_name = sanitize_file_name(raw)
                .ok_or_else(|| EngineError::Validation(format!("invalid file name '{}'", raw)))?;
            let path = self.settings.attachment_dir.join(&file_name);
            let content = read_upload(&path).await?;
            attachments.push(Attachment {
                content_type: mime_type_for(&file_name),
                file_name,
                content,
            });
        }
        Ok(attachments)
    }

    /// Create the change, then attach the uploaded files to it.
    ///
    /// Files are read before the change is created so a missing upload fails
    /// the call without leaving a change behind.
    pub async fn create_with_impact(
        &self,
        uploaded_files: &str,
        config_items: &str,
        submission: &ChangeSubmission,
    ) -> Result<CreatedChange> {
        let missing = submission.change.missing_fields();
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "missing required change fields: {}",
                missing.join(", ")
            )));
        }

        let attachments = self.load_attachments(uploaded_files).await?;
        let draft = &submission.change;

        let new_change = NewChangeRequest {
            short_description: draft.short_description.clone(),
            description: draft.description.clone(),
            cmdb_ci: split_list(config_items).next().unwrap_or_default().to_string(),
            chg_model: draft.chg_model.clone(),
            implementation_plan: draft.implementation_plan.clone(),
            backout_plan: draft.backout_plan.clone(),
            test_plan: draft.test_plan.clone(),
            risk_impact_analysis: submission.risk_impact_analysis.clone(),
            ..NewChangeRequest::default()
        }
        .scheduled_from(Utc::now());

        let created = bounded(
            self.settings.call_timeout,
            "change creation",
            self.ticketing.create_change_request(&new_change),
        )
        .await?;
        info!("Created change {}", created.number);

        let mut result = CreatedChange {
            change_number: created.number,
            change_link: created.target_link,
            attachments: Vec::new(),
            failed_attachments: Vec::new(),
        };

        for attachment in attachments {
            let upload = bounded(
                self.settings.call_timeout,
                "attachment upload",
                self.ticketing.attach_file(
                    CHANGE_TABLE,
                    &created.sys_id,
                    &attachment.file_name,
                    attachment.content_type,
                    attachment.content,
                ),
            )
            .await;

            match upload {
                Ok(_) => result.attachments.push(attachment.file_name),
                Err(e) => {
                    warn!("Attaching {} to {} failed: {}", attachment.file_name, result.change_number, e);
                    result.failed_attachments.push(attachment.file_name);
                }
            }
        }

        Ok(result)
    }
}

async fn read_upload(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            EngineError::Validation(format!("uploaded file {} does not exist", path.display()))
        }
        _ => EngineError::Attachment(format!("{}: {}", path.display(), e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_draft_with_preamble() {
        let reply = "Sure! {\"short_description\":\"x\",\"description\":\"d\",\"implementation_plan\":\"i\",\n\"backout_plan\":\"b\",\"test_plan\":\"t\",\"chg_model\":\"normal\"} Thanks!";
        let draft = parse_change_draft(reply).unwrap();
        assert_eq!(draft.chg_model, "normal");
        assert_eq!(draft.short_description, "x");
    }

    #[test]
    fn test_parse_draft_failures() {
        assert!(matches!(parse_change_draft("no json here"), Err(EngineError::DraftParse(_))));
        assert!(matches!(
            parse_change_draft("{\"short_description\":\"x\"}"),
            Err(EngineError::DraftParse(m)) if m.contains("description")
        ));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\tmp\\my arch (v2).png").as_deref(), Some("my_arch__v2_.png"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("arch.PNG"), "image/png");
        assert_eq!(mime_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("notes.txt"), "text/plain");
        assert_eq!(mime_type_for("archive"), "application/octet-stream");
    }

    #[test]
    fn test_missing_fields() {
        let draft = ChangeDraft {
            short_description: "x".into(),
            chg_model: "normal".into(),
            ..ChangeDraft::default()
        };
        assert_eq!(
            draft.missing_fields(),
            vec!["description", "implementation_plan", "backout_plan", "test_plan"]
        );
    }
}
