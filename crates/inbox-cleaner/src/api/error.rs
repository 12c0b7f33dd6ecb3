use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::db::DatabaseError;
use crate::provider::ProviderError;
use crate::report::ReportError;
use crate::scan::ScanError;

/// Errors returned by HTTP handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthenticated,
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            ApiError::Unauthenticated => (StatusCode::BAD_REQUEST, "not authenticated".to_string()),
            ApiError::Conflict(s) => (StatusCode::CONFLICT, s),
            ApiError::BadGateway(s) => {
                tracing::warn!(error = %s, "Upstream provider error");
                (StatusCode::BAD_GATEWAY, s)
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Provider(e) => e.into(),
            ScanError::AlreadyRunning(_) => ApiError::Conflict("scan already running".to_string()),
            ScanError::Database(e) => e.into(),
            ScanError::Aborted(reason) => ApiError::Internal(reason),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthenticated(_) => ApiError::Unauthenticated,
            ProviderError::CredentialStore(e) => ApiError::Internal(e),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
