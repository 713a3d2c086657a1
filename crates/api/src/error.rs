//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use projections::ProjectionError;
use settlement::{ErrorKind, SettlementError};

/// API-level error type that maps to HTTP responses.
///
/// Every response body is `{"error": <message>, "kind": <error kind>}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    /// Malformed path or query parameters.
    BadRequest(String),
    Settlement(SettlementError),
    /// A read model could not be refreshed.
    Projection(ProjectionError),
    Internal(String),
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition
        | ErrorKind::Conflict
        | ErrorKind::DuplicatePendingWithdrawal => StatusCode::CONFLICT,
        ErrorKind::InvalidCode
        | ErrorKind::InsufficientStock
        | ErrorKind::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotPermitted => StatusCode::FORBIDDEN,
        ErrorKind::ExternalServiceDegraded => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Settlement(err) => err.kind(),
            ApiError::Projection(_) | ApiError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
            ApiError::Settlement(err) => err.to_string(),
            ApiError::Projection(err) => err.to_string(),
        };

        metrics::counter!("api_errors_total", "kind" => kind.as_str()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, %kind, "request failed");
        } else {
            tracing::debug!(error = %message, %kind, "request rejected");
        }

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}
