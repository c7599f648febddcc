use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::chat::{ChatStatus, ChatTurn};
use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::state::AppState;

/// Longest question accepted, in characters.
pub const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// POST /api/v1/chat
/// An empty question is answered (with the fallback text), not rejected.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatTurn>, AppError> {
    if req.question.chars().count() > MAX_QUESTION_CHARS {
        return Err(AppError::Validation(format!(
            "question must be at most {MAX_QUESTION_CHARS} characters"
        )));
    }
    Ok(Json(state.chat.turn(&req.question).await))
}

/// GET /api/v1/chat/status
pub async fn handle_chat_status(State(state): State<AppState>) -> Json<ChatStatus> {
    Json(state.chat.status().await)
}

/// POST /api/v1/chat/initialize
pub async fn handle_chat_initialize(
    State(state): State<AppState>,
) -> Result<Json<ChatStatus>, AppError> {
    if !state.chat.warm_up().await {
        return Err(AppError::ModelUnavailable(
            "The model is not downloaded or could not be loaded".to_string(),
        ));
    }
    Ok(Json(state.chat.status().await))
}

/// POST /api/v1/chat/release
pub async fn handle_chat_release(State(state): State<AppState>) -> StatusCode {
    state.chat.release().await;
    StatusCode::NO_CONTENT
}

/// GET /api/v1/profile
pub async fn handle_get_profile(State(state): State<AppState>) -> Json<Profile> {
    Json(state.profile.as_ref().clone())
}
