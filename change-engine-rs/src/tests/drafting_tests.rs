//! Drafting and submission workflow tests

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use tempfile::TempDir;

    use itsm_client::{AttachmentRecord, ConfigurationItem, CreatedRecord, ServiceError};
    use llm_gateway::ChatMessage;

    use crate::drafting::{ChangeDraft, ChangeSubmission, DraftRequest, DraftingOrchestrator};
    use crate::error::EngineError;
    use crate::service_map::ServiceMapBuilder;
    use crate::settings::EngineSettings;
    use crate::tests::mocks::{edge, MockCmdb, MockGenerator, MockRetriever, MockTicketing};

    const DRAFT_JSON: &str = "Sure! Here is the change:\n{\"short_description\":\"Patch web01\",\"description\":\"Kernel update\",\
        \"implementation_plan\":\"1. drain\",\"backout_plan\":\"rollback\",\"test_plan\":\"smoke\",\"chg_model\":\"normal\"}\nThanks!";

    fn last_prompt(messages: &[ChatMessage]) -> String {
        messages.last().map(|m| m.text()).unwrap_or_default()
    }

    /// Replies by prompt kind: brief, change document or service-map impact
    fn scripted_generator() -> MockGenerator {
        let mut generator = MockGenerator::new();
        generator.expect_generate().returning(|messages: Vec<ChatMessage>| {
            let prompt = last_prompt(&messages);
            if prompt.contains("create a JSON document for change request") {
                Ok(DRAFT_JSON.to_string())
            } else if prompt.contains("Service Map For CI") {
                Ok("service map impact".to_string())
            } else {
                Ok("Create a change to patch the kernel".to_string())
            }
        });
        generator
    }

    fn empty_retriever() -> MockRetriever {
        let mut retriever = MockRetriever::new();
        retriever.expect_search().returning(|_, _| Ok(Vec::new()));
        retriever
    }

    fn orchestrator(
        ticketing: MockTicketing,
        cmdb: MockCmdb,
        generator: MockGenerator,
        attachment_dir: &Path,
    ) -> DraftingOrchestrator {
        let settings = EngineSettings {
            attachment_dir: attachment_dir.to_path_buf(),
            ..EngineSettings::default()
        };
        DraftingOrchestrator::new(
            Arc::new(ticketing),
            Arc::new(empty_retriever()),
            Arc::new(generator),
            ServiceMapBuilder::with_settings(Arc::new(cmdb), &settings),
            settings,
        )
    }

    fn request(config_items: &str, uploaded_files: &str) -> DraftRequest {
        DraftRequest {
            change_title: "Kernel patch".into(),
            change_purpose: "Security fix".into(),
            os_info: "RHEL 8".into(),
            uploaded_files: uploaded_files.into(),
            config_items: config_items.into(),
        }
    }

    fn submission() -> ChangeSubmission {
        ChangeSubmission {
            change: ChangeDraft {
                short_description: "Patch web01".into(),
                description: "Kernel update".into(),
                implementation_plan: "1. drain".into(),
                backout_plan: "rollback".into(),
                test_plan: "smoke".into(),
                chg_model: "normal".into(),
            },
            risk_impact_analysis: "Web tier degraded for 10 minutes".into(),
        }
    }

    #[tokio::test]
    async fn test_firewall_items_skip_service_map() {
        let dir = TempDir::new().unwrap();
        let mut cmdb = MockCmdb::new();
        cmdb.expect_find_configuration_items().never();
        cmdb.expect_get_ci_relationships().never();

        let outcome = orchestrator(MockTicketing::new(), cmdb, scripted_generator(), dir.path())
            .draft(&request("Firewall-01", ""))
            .await
            .unwrap();

        assert_eq!(outcome.change_details.chg_model, "normal");
        assert_eq!(outcome.impact_analysis, "");
    }

    #[tokio::test]
    async fn test_title_or_purpose_required() {
        let dir = TempDir::new().unwrap();
        let mut generator = MockGenerator::new();
        generator.expect_generate().never();

        let req = DraftRequest {
            config_items: "web01".into(),
            ..DraftRequest::default()
        };
        let err = orchestrator(MockTicketing::new(), MockCmdb::new(), generator, dir.path())
            .draft(&req)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_draft_with_service_map_impact() {
        let dir = TempDir::new().unwrap();
        let mut cmdb = MockCmdb::new();
        cmdb.expect_find_configuration_items()
            .withf(|q| q == "web01")
            .returning(|_| {
                Ok(vec![ConfigurationItem {
                    sys_id: "web01".into(),
                    name: "web01".into(),
                    ..ConfigurationItem::default()
                }])
            });
        cmdb.expect_find_configuration_items()
            .withf(|q| q == "ghost")
            .returning(|_| Ok(Vec::new()));
        cmdb.expect_get_ci_relationships()
            .returning(|_| Ok(vec![edge("shop", "web01", "Depends on::Used by")]));

        let outcome = orchestrator(MockTicketing::new(), cmdb, scripted_generator(), dir.path())
            .draft(&request("web01, ghost", ""))
            .await
            .unwrap();

        assert_eq!(outcome.change_details.short_description, "Patch web01");
        assert_eq!(outcome.impact_analysis, "service map impact");
    }

    #[tokio::test]
    async fn test_draft_with_architecture_diagram() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("arch.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let mut generator = scripted_generator();
        generator
            .expect_generate_with_image()
            .withf(|prompt, image, mime| {
                prompt.contains("Patch web01") && image == [0x89, 0x50, 0x4e, 0x47] && mime == "image/png"
            })
            .times(1)
            .returning(|_, _, _| Ok("diagram impact".to_string()));

        let outcome = orchestrator(MockTicketing::new(), MockCmdb::new(), generator, dir.path())
            .draft(&request("", "arch.png"))
            .await
            .unwrap();
        assert_eq!(outcome.impact_analysis, "diagram impact");
    }

    #[tokio::test]
    async fn test_unparseable_draft() {
        let dir = TempDir::new().unwrap();
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok("I cannot help with that.".to_string()));

        let err = orchestrator(MockTicketing::new(), MockCmdb::new(), generator, dir.path())
            .draft(&request("", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DraftParse(_)));
    }

    #[tokio::test]
    async fn test_create_with_impact_attaches_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("arch.png"), b"png-bytes").unwrap();

        let mut ticketing = MockTicketing::new();
        ticketing
            .expect_create_change_request()
            .withf(|change| {
                change.cmdb_ci == "web01"
                    && change.risk_impact_analysis == "Web tier degraded for 10 minutes"
                    && change.chg_model == "normal"
                    && !change.start_date.is_empty()
                    && !change.end_date.is_empty()
            })
            .times(1)
            .returning(|_| {
                Ok(CreatedRecord {
                    number: "CHG0040001".into(),
                    sys_id: "chg-new".into(),
                    target_link: "https://example.service-now.com/chg-new".into(),
                })
            });
        ticketing
            .expect_attach_file()
            .withf(|table, sys_id, name, mime, content| {
                table == "change_request"
                    && sys_id == "chg-new"
                    && name == "arch.png"
                    && mime == "image/png"
                    && content == b"png-bytes"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(AttachmentRecord::default()));

        let created = orchestrator(ticketing, MockCmdb::new(), MockGenerator::new(), dir.path())
            .create_with_impact("../arch.png", "web01, db01", &submission())
            .await
            .unwrap();

        assert_eq!(created.change_number, "CHG0040001");
        assert_eq!(created.attachments, vec!["arch.png"]);
        assert!(created.failed_attachments.is_empty());
    }

    #[tokio::test]
    async fn test_create_with_impact_requires_fields() {
        let dir = TempDir::new().unwrap();
        let mut ticketing = MockTicketing::new();
        ticketing.expect_create_change_request().never();

        let mut incomplete = submission();
        incomplete.change.test_plan.clear();

        let err = orchestrator(ticketing, MockCmdb::new(), MockGenerator::new(), dir.path())
            .create_with_impact("", "web01", &incomplete)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(m) if m.contains("test_plan")));
    }

    #[tokio::test]
    async fn test_missing_upload_fails_before_creation() {
        let dir = TempDir::new().unwrap();
        let mut ticketing = MockTicketing::new();
        ticketing.expect_create_change_request().never();

        let err = orchestrator(ticketing, MockCmdb::new(), MockGenerator::new(), dir.path())
            .create_with_impact("missing.png", "", &submission())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_failure_is_explicit() {
        let dir = TempDir::new().unwrap();
        let mut ticketing = MockTicketing::new();
        ticketing
            .expect_create_change_request()
            .returning(|_| Err(ServiceError::authorization("ACL denied")));

        let err = orchestrator(ticketing, MockCmdb::new(), MockGenerator::new(), dir.path())
            .create_with_impact("", "", &submission())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(m) if m.contains("ACL denied")));
    }
}
