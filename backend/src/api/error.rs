//! REST error type
//!
//! Handlers return `Result<_, ApiError>`. Domain errors that carry an HTTP
//! meaning are recognised by downcasting the `anyhow` chain; anything else is
//! logged and reported as a generic 500.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::{AuthError, CatalogError, LibraryError, SyncError, UpstreamError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(auth) = err.downcast_ref::<AuthError>() {
            return match auth {
                AuthError::EmailTaken => ApiError::Conflict(auth.to_string()),
                AuthError::InvalidCredentials | AuthError::InvalidToken => {
                    ApiError::Unauthorized(auth.to_string())
                }
                AuthError::InvalidInput(msg) => ApiError::BadRequest(msg.to_string()),
            };
        }
        if let Some(catalog) = err.downcast_ref::<CatalogError>() {
            return ApiError::BadRequest(catalog.to_string());
        }
        if let Some(library) = err.downcast_ref::<LibraryError>() {
            return ApiError::NotFound(library.to_string());
        }
        if let Some(UpstreamError::NotFound { service }) = err.downcast_ref::<UpstreamError>() {
            return ApiError::NotFound(format!("Not found on {}", service));
        }
        ApiError::Internal(err)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected => ApiError::Unauthorized("Trakt not connected".to_string()),
            SyncError::Internal(e) => e.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_status() {
        let cases: Vec<(anyhow::Error, StatusCode)> = vec![
            (AuthError::EmailTaken.into(), StatusCode::CONFLICT),
            (AuthError::InvalidToken.into(), StatusCode::UNAUTHORIZED),
            (CatalogError::MissingIdentifier("id").into(), StatusCode::BAD_REQUEST),
            (LibraryError::NotFound("Episode").into(), StatusCode::NOT_FOUND),
            (
                UpstreamError::NotFound { service: "TMDB" }.into(),
                StatusCode::NOT_FOUND,
            ),
            (anyhow::anyhow!("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_not_connected_is_unauthorized() {
        let err: ApiError = SyncError::NotConnected.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Trakt not connected");
    }
}
