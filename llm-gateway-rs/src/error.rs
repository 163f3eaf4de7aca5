// llm-gateway-rs/src/error.rs

use thiserror::Error;

/// Failure talking to the model provider, classified for retry decisions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 400, 401, 403, 404 or a missing API key
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// 500, 502, 503, 504
    #[error("Server error: {0}")]
    ServerError(String),

    /// Connection failures and timeouts
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ServerError(_) | LlmError::NetworkError(_) | LlmError::RateLimitExceeded(_)
        )
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            400 if body.contains("model_not_found") || body.contains("does not exist") => {
                LlmError::ModelNotAvailable(body)
            }
            400 => LlmError::InvalidRequest(format!("Bad request: {}", body)),
            401 => LlmError::InvalidRequest(format!("Unauthorized: {}", body)),
            403 => LlmError::InvalidRequest(format!("Forbidden: {}", body)),
            404 => LlmError::ModelNotAvailable(format!("Not found: {}", body)),
            429 => LlmError::RateLimitExceeded(body),
            500 | 502 | 503 | 504 => LlmError::ServerError(format!("({}) {}", status, body)),
            _ => LlmError::UnknownError(format!("({}) {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::NetworkError(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::NetworkError(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::NetworkError(err.to_string())
        }
    }
}
