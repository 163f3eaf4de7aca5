//! Knowledge assistant tests with mocked ticketing, retrieval and generation

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use itsm_client::{Condition, KnowledgeArticle, ServiceError};
    use kb_retriever::{Document, InMemoryRetriever, ScoredDocument};
    use llm_gateway::ChatMessage;

    use crate::error::EngineError;
    use crate::knowledge::{KnowledgeAssistant, NO_ARTICLES_NOTICE, REFERENCE_HEADER};
    use crate::settings::EngineSettings;
    use crate::tests::mocks::{created, MockGenerator, MockRetriever, MockTicketing};

    fn chunk(number: &str, content: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document: Document::new(content).with_source(number),
            score,
        }
    }

    fn retriever_returning(docs: Vec<ScoredDocument>) -> MockRetriever {
        let mut retriever = MockRetriever::new();
        retriever.expect_search().returning(move |_, _| Ok(docs.clone()));
        retriever
    }

    fn assistant(
        ticketing: MockTicketing,
        retriever: MockRetriever,
        sink: Arc<InMemoryRetriever>,
        generator: MockGenerator,
    ) -> KnowledgeAssistant {
        KnowledgeAssistant::new(
            Arc::new(ticketing),
            Arc::new(retriever),
            sink,
            Arc::new(generator),
            EngineSettings::default(),
        )
    }

    fn article(sys_id: &str, number: &str, text: &str) -> KnowledgeArticle {
        KnowledgeArticle {
            sys_id: sys_id.into(),
            number: number.into(),
            short_description: format!("{} title", number),
            text: text.into(),
            ..KnowledgeArticle::default()
        }
    }

    #[tokio::test]
    async fn test_answer_cites_relevant_articles() {
        let retriever = retriever_returning(vec![
            chunk("KB0010002", "Run nginx -t. ", 0.9),
            chunk("KB0010001", "Check upstream pool.", 0.7),
            chunk("KB0010002", "Reload nginx.", 0.6),
            chunk("KB0019999", "Unrelated printer fix", 0.2),
        ]);

        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|messages: Vec<ChatMessage>| {
                let prompt = messages.last().map(|m| m.text()).unwrap_or_default();
                assert!(prompt.contains("1. Article number - KB0010002\nArticle summary - Run nginx -t. Reload nginx."));
                assert!(prompt.contains("2. Article number - KB0010001"));
                assert!(!prompt.contains("KB0019999"));
                assert!(prompt.contains("```nginx returns 502```"));
                Ok("1. Run nginx -t [KB0010002]".to_string())
            });

        let answer = assistant(
            MockTicketing::new(),
            retriever,
            Arc::new(InMemoryRetriever::new()),
            generator,
        )
        .contextual_response(" nginx returns 502 ")
        .await
        .unwrap();

        assert_eq!(answer.articles, vec!["KB0010002", "KB0010001"]);
        assert_eq!(
            answer.response,
            format!("{}KB0010002\nKB0010001\n\n\n1. Run nginx -t [KB0010002]", REFERENCE_HEADER)
        );
    }

    #[tokio::test]
    async fn test_no_relevant_article_drafts_solution() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|messages: Vec<ChatMessage>| {
                assert_eq!(messages.last().map(|m| m.text()).as_deref(), Some("disk full on db01"));
                Ok("Step 1: df -h".to_string())
            });

        let answer = assistant(
            MockTicketing::new(),
            retriever_returning(vec![chunk("KB0010001", "printer", 0.1)]),
            Arc::new(InMemoryRetriever::new()),
            generator,
        )
        .contextual_response("disk full on db01")
        .await
        .unwrap();

        assert!(answer.articles.is_empty());
        assert_eq!(
            answer.response,
            format!("{}{}Step 1: df -h", REFERENCE_HEADER, NO_ARTICLES_NOTICE)
        );
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let mut retriever = MockRetriever::new();
        retriever.expect_search().never();

        let err = assistant(
            MockTicketing::new(),
            retriever,
            Arc::new(InMemoryRetriever::new()),
            MockGenerator::new(),
        )
        .contextual_response("   ")
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_index_articles_skips_empty_bodies() {
        let mut ticketing = MockTicketing::new();
        ticketing
            .expect_get_knowledge_articles()
            .withf(|conditions: &Vec<Condition>| conditions.len() == 1 && conditions[0].param == "workflow_state")
            .returning(|_| {
                Ok(vec![
                    article("kb1", "KB0010001", "<p>Restart <b>nginx</b></p>"),
                    article("kb2", "KB0010002", "<p> </p>"),
                    article("kb3", "KB0010003", "Rotate logs"),
                ])
            });

        let sink = Arc::new(InMemoryRetriever::new());
        let report = assistant(ticketing, MockRetriever::new(), sink.clone(), MockGenerator::new())
            .index_articles(vec![Condition::eq("workflow_state", "published")])
            .await
            .unwrap();

        assert_eq!(report.indexed, vec!["KB0010001", "KB0010003"]);
        assert_eq!(report.skipped, vec!["kb2"]);
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test]
    async fn test_publish_article_indexes_it() {
        let mut ticketing = MockTicketing::new();
        ticketing
            .expect_create_knowledge_article()
            .withf(|title, text| title == "Reset VPN token" && text == "<p>Open the portal</p>")
            .times(1)
            .returning(|_, _| Ok(created("KB0010050", "kb50")));

        let sink = Arc::new(InMemoryRetriever::new());
        let record = assistant(ticketing, MockRetriever::new(), sink.clone(), MockGenerator::new())
            .publish_article("Reset VPN token", "<p>Open the portal</p>")
            .await
            .unwrap();

        assert_eq!(record.number, "KB0010050");
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces() {
        let mut ticketing = MockTicketing::new();
        ticketing
            .expect_create_knowledge_article()
            .returning(|_, _| Err(ServiceError::authorization("ACL denied")));

        let sink = Arc::new(InMemoryRetriever::new());
        let err = assistant(ticketing, MockRetriever::new(), sink.clone(), MockGenerator::new())
            .publish_article("Reset VPN token", "text")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 502);
        assert!(sink.is_empty().await);
    }
}
