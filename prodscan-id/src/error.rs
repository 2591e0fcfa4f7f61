//! Error types for prodscan-id
//!
//! Only failures that happen before streaming starts become HTTP errors;
//! per-region failures are reported inside the event stream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400), e.g. no file uploaded
    #[error("{0}")]
    BadRequest(String),

    /// Upload exceeds the configured body limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Annotation oracle unreachable during localization (502)
    #[error("{0}")]
    OracleUnavailable(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::OracleUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) | ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidImage(_) => ApiError::BadRequest(err.to_string()),
            PipelineError::OracleUnavailable(_) => ApiError::OracleUnavailable(err.to_string()),
            PipelineError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
