/// Response bodies and the HTTP error type.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::errors::ParserError;

/// Body of the 400 returned when the `image` part is missing.
pub const NO_IMAGE: &str = "No image provided";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    /// Whether the trained detector is loaded.
    pub model_loaded: bool,
    pub captioner_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ParserError> for ApiError {
    fn from(e: ParserError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(msg) => {
                error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_errors_become_internal() {
        let err: ApiError = ParserError::InvalidInput("zero size".into()).into();
        assert!(matches!(err, ApiError::Internal(ref m) if m.contains("zero size")));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let resp = ApiError::BadRequest(NO_IMAGE.into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
