use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::model::ModelError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("File system access is not available")]
    FilesystemUnavailable,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model corrupted: {0}")]
    Corrupted(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ModelError> for AppError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::UnknownArtifact(id) => AppError::NotFound(format!("Model '{id}' not found")),
            ModelError::FilesystemUnavailable => AppError::FilesystemUnavailable,
            ModelError::Transport(_) | ModelError::HttpStatus { .. } | ModelError::Incomplete(_) => {
                AppError::Transport(e.to_string())
            }
            ModelError::Corrupted { .. } => AppError::Corrupted(e.to_string()),
            ModelError::DownloadInProgress(_) => AppError::Conflict(e.to_string()),
            ModelError::Io(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::ModelUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::FilesystemUnavailable => (
                StatusCode::NOT_IMPLEMENTED,
                "FILESYSTEM_UNAVAILABLE",
                "Model storage is not available in this deployment".to_string(),
            ),
            AppError::Transport(msg) => {
                tracing::error!("Transport error: {msg}");
                (StatusCode::BAD_GATEWAY, "TRANSPORT_FAILURE", msg.clone())
            }
            AppError::Corrupted(msg) => {
                tracing::error!("Corrupted model: {msg}");
                (StatusCode::BAD_GATEWAY, "MODEL_CORRUPTED", msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "DOWNLOAD_IN_PROGRESS", msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_map_to_statuses() {
        let cases = [
            (ModelError::UnknownArtifact("x".into()), StatusCode::NOT_FOUND),
            (ModelError::FilesystemUnavailable, StatusCode::NOT_IMPLEMENTED),
            (ModelError::HttpStatus { status: 404 }, StatusCode::BAD_GATEWAY),
            (
                ModelError::Corrupted {
                    path: "/m/x.gguf".into(),
                    size: 10,
                    floor: 100,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (ModelError::DownloadInProgress("x".into()), StatusCode::CONFLICT),
            (ModelError::Incomplete("x".into()), StatusCode::BAD_GATEWAY),
            (
                ModelError::Io(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_model_unavailable_is_503() {
        let response = AppError::ModelUnavailable("not downloaded".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
