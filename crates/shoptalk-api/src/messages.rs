use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use shoptalk_types::api::{AssistantTurnRequest, SendMessageRequest};
use shoptalk_types::models::Participant;

use crate::AppState;
use crate::error::{ApiError, join_error};

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .router
        .send_direct(req.from_id, req.to_id, &req.content)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/messages/ai
pub async fn assistant_turn(
    State(state): State<AppState>,
    Json(req): Json<AssistantTurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_message, assistant_message) = state
        .router
        .run_assistant_turn(req.from_id, &req.content)
        .await?;

    Ok(Json([user_message, assistant_message]))
}

/// GET /api/messages/{a}/{b}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((a, b)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let a = Participant::from_id(a)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid participant id {}", a)))?;
    let b = Participant::from_id(b)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid participant id {}", b)))?;

    let store = state.store.clone();
    let messages = tokio::task::spawn_blocking(move || store.get_messages(a, b))
        .await
        .map_err(join_error)??;

    Ok(Json(messages))
}

/// GET /api/messages/ai/{user_id}
pub async fn get_assistant_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = Participant::from_id(user_id)
        .filter(|p| !p.is_assistant())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid user id {}", user_id)))?;

    let store = state.store.clone();
    let messages =
        tokio::task::spawn_blocking(move || store.get_messages(user, Participant::Assistant))
            .await
            .map_err(join_error)??;

    Ok(Json(messages))
}
