//! Response envelope shared by every `/api/v1` route.
//!
//! Success: `{"code":200,"output":{"data":..,"message":..}}`
//! Failure: `{"code":<status>,"error":{"data":null,"message":..}}`, with the
//! HTTP status equal to `code`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use change_engine::EngineError;
use itsm_client::ServiceError;

#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    pub data: T,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub output: Outcome<T>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: Outcome<Option<()>>,
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: StatusCode::OK.as_u16(),
        output: Outcome {
            data,
            message: message.into(),
        },
    })
}

/// Workflow failure rendered as an error envelope
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError(EngineError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            code: status.as_u16(),
            error: Outcome {
                data: None,
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body, turning malformed input into a 400 envelope
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}
