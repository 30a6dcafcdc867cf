//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, correlation_id) = match &self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone(), None),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
            ApiError::Internal(message) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(%correlation_id, error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    Some(correlation_id),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: message,
            correlation_id,
        });
        (status, body).into_response()
    }
}
