//! API error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use ragvault_protocols::RetrievalError;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Retrieval(err) => match err {
                RetrievalError::DimensionMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RetrievalError::EmbeddingUnavailable(_)
                | RetrievalError::IndexUnavailable(_)
                | RetrievalError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                RetrievalError::NotFound(_) => StatusCode::NOT_FOUND,
                RetrievalError::DuplicateContent(_) => StatusCode::CONFLICT,
                RetrievalError::InvalidQuery(_) | RetrievalError::InvalidMetadata(_) => {
                    StatusCode::BAD_REQUEST
                }
            },
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Retrieval(err) => match err {
                RetrievalError::DimensionMismatch { .. } => "dimension_mismatch",
                RetrievalError::DuplicateContent(_) => "duplicate_content",
                RetrievalError::EmbeddingUnavailable(_) => "embedding_unavailable",
                RetrievalError::IndexUnavailable(_) => "index_unavailable",
                RetrievalError::NotFound(_) => "not_found",
                RetrievalError::InvalidQuery(_) => "invalid_query",
                RetrievalError::InvalidMetadata(_) => "invalid_metadata",
                RetrievalError::Cancelled => "cancelled",
            },
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Retrieval(err) if err.is_retryable())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            retryable: self.retryable(),
        };
        (status, Json(body)).into_response()
    }
}
