use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::oauth::ConnectorError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream platform error: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => AppError::NotFound("Resource not found".to_string()),
            StorageError::Constraint(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ConnectorError> for AppError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::InvalidState
            | ConnectorError::StateExpired
            | ConnectorError::NoRefreshToken
            | ConnectorError::UnresolvedIdentity { .. } => AppError::BadRequest(err.to_string()),
            ConnectorError::UnsupportedPlatform(_) => AppError::BadRequest(err.to_string()),
            ConnectorError::AccountNotFound => AppError::NotFound(err.to_string()),
            ConnectorError::TokenExchange(_)
            | ConnectorError::IdentityResolution(_)
            | ConnectorError::Platform { .. }
            | ConnectorError::Http(_) => AppError::Upstream(err.to_string()),
            ConnectorError::Storage(storage) => storage.into(),
            ConnectorError::Configuration(msg) => AppError::Internal(msg),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized(format!("Authentication failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream platform error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: AppError = StorageError::NotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = StorageError::Database("disk full".to_string()).into();
        assert!(matches!(err, AppError::Internal(_)));

        let err: AppError = StorageError::Constraint("email taken".to_string()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_connector_error_mapping() {
        let err: AppError = ConnectorError::InvalidState.into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = ConnectorError::StateExpired.into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = ConnectorError::AccountNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = ConnectorError::TokenExchange("bad code".to_string()).into();
        assert!(matches!(err, AppError::Upstream(_)));

        let err: AppError = ConnectorError::Platform {
            code: Some(190),
            message: "token expired".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::Unauthorized("denied".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::Upstream("platform down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = AppError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
