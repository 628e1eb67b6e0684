//! Maps domain errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relic_core::{AppError, BackupError, StoreError};
use serde_json::json;

/// Handler error wrapper rendering `{"error": ...}` bodies.
#[derive(Debug)]
pub struct HttpError(pub AppError);

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl From<BackupError> for HttpError {
    fn from(value: BackupError) -> Self {
        Self(AppError::Backup(value))
    }
}

impl From<StoreError> for HttpError {
    fn from(value: StoreError) -> Self {
        Self(AppError::Storage(value))
    }
}

impl HttpError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match &self.0 {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Storage(StoreError::NotFound(key)) => {
                (StatusCode::NOT_FOUND, format!("Backup not found: {}", key))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Backup(BackupError::StoreList(err)) => {
                tracing::error!("Failed to list backups: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    "Backup storage is unavailable".to_string(),
                )
            }
            AppError::Storage(err) => {
                tracing::error!("Storage error: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    "Backup storage is unavailable".to_string(),
                )
            }
            other => {
                tracing::error!("Internal error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<HttpError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn maps_app_errors_to_status_codes() {
        assert_eq!(status_of(AppError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AppError::BadRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Conflict("busy".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StoreError::NotFound("db/x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(AppError::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_of(BackupError::ProducerFailure {
                attempts: 3,
                last_error: "boom".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
