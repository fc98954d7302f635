use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use shoptalk_types::api::CreateUserRequest;

use crate::AppState;
use crate::error::ApiError;

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    let name = req.name.trim();
    if username.is_empty() || name.is_empty() {
        return Err(ApiError::BadRequest(
            "username and name are required".to_string(),
        ));
    }

    if state.store.get_user_by_username(username)?.is_some() {
        return Err(ApiError::Conflict("username is already taken".to_string()));
    }

    let user = state.store.create_user(username, req.kind, name)?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .get_user(id)?
        .ok_or(ApiError::NotFound("user not found"))?;

    Ok(Json(user))
}
