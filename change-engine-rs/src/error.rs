//! Error type shared by the change workflows.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use itsm_client::ServiceError;
use kb_retriever::RetrieverError;
use llm_gateway::LlmError;

use crate::extraction::ExtractionError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Ticketing system unreachable or rejected the call
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Credential error: {0}")]
    Secret(String),

    #[error("Suggestion extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Could not parse drafted change: {0}")]
    DraftParse(String),

    #[error("Text generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrieverError),

    #[error("Attachment error: {0}")]
    Attachment(String),
}

impl EngineError {
    /// HTTP status the gateway reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::NotFound(_) => 404,
            EngineError::Validation(_) => 400,
            EngineError::Extraction(_) | EngineError::DraftParse(_) => 422,
            EngineError::Transport(_)
            | EngineError::Generation(_)
            | EngineError::Retrieval(_)
            | EngineError::Secret(_) => 502,
            EngineError::Timeout(_) => 504,
            EngineError::Attachment(_) => 500,
        }
    }
}

impl From<ServiceError> for EngineError {
    fn from(err: ServiceError) -> Self {
        match err.root() {
            ServiceError::NotFound(msg) => EngineError::NotFound(msg.clone()),
            ServiceError::Validation(msg) => EngineError::Validation(msg.clone()),
            ServiceError::Timeout(msg) => EngineError::Timeout(msg.clone()),
            ServiceError::Credentials(inner) => EngineError::Secret(inner.to_string()),
            _ => EngineError::Transport(err.to_string()),
        }
    }
}

/// Run `fut` under `limit`, converting its error and reporting expiry as `Timeout`
pub(crate) async fn bounded<T, E, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<EngineError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(EngineError::Timeout(format!("{} exceeded {:?}", what, limit))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_mapping() {
        let err: EngineError = ServiceError::not_found("CHG0000001")
            .on_table("change_request")
            .into();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.status_code(), 404);

        let err: EngineError = ServiceError::service("boom").into();
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, EngineError>(())
        };
        let err = bounded(Duration::from_millis(10), "slow call", slow).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(m) if m.contains("slow call")));
    }
}
