//! Maps crate and request-validation errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::error::{Error as CoreError, StorageError};

/// Result type used by route handlers.
pub type Result<T> = std::result::Result<T, WebError>;

/// An error surfaced to an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// The request body or a path/query parameter was malformed.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// The referenced document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lower-level crate error that doesn't warrant a more specific status.
    #[error("internal error: {0}")]
    Internal(#[from] CoreError),
}

impl WebError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(CoreError::Storage(StorageError::DocumentNotFound { .. })) => {
                StatusCode::NOT_FOUND
            }
            Self::Internal(CoreError::Validation { .. }) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_maps_to_400() {
        let err = WebError::BadRequest("missing field".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = WebError::NotFound("doc-1".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_document_not_found_maps_to_404() {
        let err: WebError = CoreError::Storage(StorageError::DocumentNotFound {
            document_id: "doc-1".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error_maps_to_400() {
        let err: WebError = CoreError::Validation {
            message: "bad input".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_other_internal_error_maps_to_500() {
        let err: WebError = CoreError::InvalidState {
            message: "oops".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
