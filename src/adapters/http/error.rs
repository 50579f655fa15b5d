//! API error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::ports::StoreError;

/// Errors surfaced to API callers before a stream opens.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Malformed or invalid input; not retried.
    #[error("{0}")]
    BadRequest(String),

    /// The referenced resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The upstream agent could not be reached; safe to retry.
    #[error("agent unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Unexpected server failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnreachable(_) => "agent_unreachable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(format!("conversation {id}")),
            StoreError::Database(message) => Self::Internal(message),
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::ConversationId;

    #[test]
    fn maps_statuses() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::UpstreamUnreachable("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_not_found_becomes_api_not_found() {
        let id = ConversationId::new();
        let error: ApiError = StoreError::NotFound(id).into();
        assert!(matches!(error, ApiError::NotFound(_)));
        assert!(error.to_string().contains(&id.to_string()));
    }

    #[test]
    fn store_database_error_becomes_internal() {
        let error: ApiError = StoreError::Database("boom".into()).into();
        assert!(matches!(error, ApiError::Internal(_)));
    }
}
