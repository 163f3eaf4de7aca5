//! Maps ServiceNow error responses onto [`ServiceError`].
//!
//! Failures arrive as
//! `{"error": {"message": "...", "detail": "..."}, "status": "failure"}`.

use reqwest::StatusCode;
use serde_json::Value;

use super::ServiceError;

/// Pull a readable message out of a ServiceNow error body
fn extract_message(json: &Value) -> Option<String> {
    let error = json.get("error")?;

    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }

    let message = error.get("message").and_then(|m| m.as_str()).unwrap_or("");
    let detail = error.get("detail").and_then(|d| d.as_str()).unwrap_or("");

    match (message.is_empty(), detail.is_empty()) {
        (true, true) => None,
        (false, true) => Some(message.to_string()),
        (true, false) => Some(detail.to_string()),
        (false, false) => Some(format!("{} ({})", message, detail)),
    }
}

/// Classify a failed table API response, keeping its status
pub fn map_http_error(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| extract_message(&json))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else if body.len() > 100 {
                format!("{}: {:.100}...", status, body)
            } else {
                format!("{}: {}", status, body)
            }
        });

    let classified = match status {
        StatusCode::UNAUTHORIZED => ServiceError::authentication(message),
        StatusCode::FORBIDDEN => ServiceError::authorization(message),
        StatusCode::NOT_FOUND => ServiceError::not_found(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ServiceError::timeout(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::rate_limit(message),
        s if s.is_server_error() => ServiceError::service(message),
        _ => ServiceError::validation(message),
    };
    classified.with_status(status.as_u16())
}

/// Statuses the instance returns for transient conditions
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}
