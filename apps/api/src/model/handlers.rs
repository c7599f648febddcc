use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::errors::AppError;
use crate::model::{DownloadEvent, Diagnostics, ModelCatalog, ModelError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ModelQuery {
    /// Catalog id; the default model when absent.
    pub model_id: Option<String>,
}

#[derive(Serialize)]
pub struct ModelStatusResponse {
    pub model_id: Option<String>,
    pub exists: bool,
    /// On-disk size, or the catalog's expected size when not downloaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<u64>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// GET /api/v1/models
pub async fn handle_list_models(State(state): State<AppState>) -> Json<ModelCatalog> {
    Json(state.models.catalog().clone())
}

/// GET /api/v1/models/status
/// Without `model_id`, reports whether any catalog model is usable.
pub async fn handle_model_status(
    State(state): State<AppState>,
    Query(params): Query<ModelQuery>,
) -> Result<Json<ModelStatusResponse>, AppError> {
    let artifact = match params.model_id.as_deref() {
        Some(id) => Some(state.models.catalog().get(id)?),
        None => None,
    };
    let exists = state.models.exists_and_valid(artifact).await;
    let size_mb = match artifact {
        Some(artifact) => Some(state.models.model_size_mb(artifact).await),
        None => None,
    };
    Ok(Json(ModelStatusResponse {
        model_id: params.model_id,
        exists,
        size_mb,
    }))
}

/// POST /api/v1/models/download
/// Streams `progress` events, then exactly one `completed` or `error`.
pub async fn handle_download_model(
    State(state): State<AppState>,
    Query(params): Query<ModelQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if !state.models.is_available() {
        return Err(ModelError::FilesystemUnavailable.into());
    }
    let model_id = state
        .models
        .catalog()
        .select(params.model_id.as_deref())?
        .id
        .clone();

    if state.models.is_downloading(&model_id) {
        return Err(ModelError::DownloadInProgress(model_id).into());
    }

    info!(model_id = %model_id, "Model download requested");
    let events = state
        .models
        .clone()
        .download_by_id(&model_id)?
        .map(|item| Ok(to_sse(item)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// DELETE /api/v1/models
pub async fn handle_delete_model(
    State(state): State<AppState>,
    Query(params): Query<ModelQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    let artifact = match params.model_id.as_deref() {
        Some(id) => Some(state.models.catalog().get(id)?),
        None => None,
    };
    let deleted = state.models.delete(artifact).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// GET /api/v1/models/diagnostics
pub async fn handle_model_diagnostics(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.models.diagnose().await)
}

fn to_sse(item: Result<DownloadEvent, ModelError>) -> Event {
    let (name, data) = match item {
        Ok(DownloadEvent::Started {
            session_id,
            artifact_id,
        }) => (
            "started",
            json!({ "session_id": session_id, "model_id": artifact_id }),
        ),
        Ok(DownloadEvent::Progress { percent }) => ("progress", json!({ "percent": percent })),
        Ok(DownloadEvent::Completed { path }) => ("completed", json!({ "path": path })),
        Err(e) => (
            "error",
            json!({
                "code": e.code(),
                "message": e.to_string(),
                "retryable": e.is_retryable(),
            }),
        ),
    };
    Event::default().event(name).data(data.to_string())
}
