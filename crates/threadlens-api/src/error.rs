//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use threadlens_core::Error;

#[derive(Debug)]
pub enum ApiError {
    Internal(Error),
    NotFound(String),
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
