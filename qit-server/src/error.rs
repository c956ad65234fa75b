//! Error types for qit-server
//!
//! Every failure is recovered at the HTTP boundary and reported as
//! `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qit_common::RecordId;
use serde_json::json;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::store::StoreError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body over the size limit (413)
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// Rows were committed before a store write failed (502)
    #[error("Stopped at row {failed_at} after committing {} row(s): {message}", .committed.len())]
    PartialCommit {
        committed: Vec<RecordId>,
        /// 1-based position of the row that failed
        failed_at: usize,
        message: String,
    },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// qit-common error
    #[error(transparent)]
    Common(#[from] qit_common::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        use qit_common::Error as Common;

        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::PartialCommit { .. } => (StatusCode::BAD_GATEWAY, "PARTIAL_COMMIT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Store(err) => match err {
                StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "RECORD_NOT_FOUND"),
                StoreError::InvalidKey(_) | StoreError::InvalidUpdate(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_RECORD_REQUEST")
                }
                _ => (StatusCode::BAD_GATEWAY, "STORE_ERROR"),
            },
            ApiError::Classifier(_) => (StatusCode::BAD_GATEWAY, "CLASSIFIER_ERROR"),
            ApiError::Common(err) => match err {
                Common::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                Common::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                Common::UnmatchedSerial(_) => (StatusCode::BAD_REQUEST, "UNMATCHED_SERIAL"),
                Common::MissingImage(_) => (StatusCode::BAD_REQUEST, "MISSING_IMAGE"),
                Common::IncompleteBatch { .. } => (StatusCode::CONFLICT, "INCOMPLETE_BATCH"),
                Common::Load(_) => (StatusCode::BAD_GATEWAY, "LOAD_FAILED"),
                Common::Config(_) | Common::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = self.to_string();

        let body = match self {
            ApiError::PartialCommit {
                committed,
                failed_at,
                ..
            } => json!({
                "error": {
                    "code": error_code,
                    "message": message,
                    "committed": committed,
                    "failedAt": failed_at,
                }
            }),
            _ => json!({
                "error": {
                    "code": error_code,
                    "message": message,
                }
            }),
        };

        if status.is_server_error() {
            tracing::warn!(code = error_code, "{}", message);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(qit_common::Error::IncompleteBatch { missing: 2 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(qit_common::Error::UnmatchedSerial("X".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(StoreError::NotFound("row 9".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StoreError::Remote {
                    status: 500,
                    body: "boom".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(ClassifierError::Api(429, "slow down".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(qit_common::Error::Load("no sheet".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_partial_commit_message() {
        let error = ApiError::PartialCommit {
            committed: vec![RecordId::new(), RecordId::new()],
            failed_at: 3,
            message: "timeout".into(),
        };
        assert_eq!(
            error.to_string(),
            "Stopped at row 3 after committing 2 row(s): timeout"
        );
    }
}
