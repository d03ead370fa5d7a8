use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// AppError
///
/// The single error type surfaced by services, extractors and handlers.
/// Every variant maps to one HTTP status in `IntoResponse`; infrastructure
/// failures are logged and rendered with a generic detail.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials or an inactive account at login.
    #[error("{0}")]
    AuthenticationDenied(String),

    /// A protected route was reached without a resolvable session user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A guard (or the CSRF check) rejected the request.
    #[error("{0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// ErrorBody
///
/// JSON payload returned for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status_code: u16,
    pub detail: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationDenied(_) | AppError::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Session(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status.is_server_error() {
            // Infrastructure details stay in the logs.
            tracing::error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}
