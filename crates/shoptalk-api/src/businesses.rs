use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use shoptalk_types::api::{CreateBusinessRequest, SearchQuery};
use shoptalk_types::models::Business;

use crate::AppState;
use crate::error::{ApiError, join_error};

/// POST /api/businesses
pub async fn create_business(
    State(state): State<AppState>,
    Json(req): Json<CreateBusinessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.description.trim().is_empty() || req.category.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "description and category are required".to_string(),
        ));
    }

    if state.store.get_user(req.user_id)?.is_none() {
        return Err(ApiError::BadRequest(format!(
            "user {} does not exist",
            req.user_id
        )));
    }
    if state.store.get_business_by_user(req.user_id)?.is_some() {
        return Err(ApiError::Conflict(
            "user already has a business profile".to_string(),
        ));
    }

    let business = state.store.create_business(
        req.user_id,
        req.description.trim(),
        req.category.trim(),
        req.location.trim(),
        &req.services,
    )?;

    Ok((StatusCode::CREATED, Json(business)))
}

/// GET /api/businesses/search?q=
///
/// Two stages: the store narrows the directory by substring, then the
/// intelligence layer reorders semantically. The second stage degrades to
/// the unranked list on any provider trouble.
pub async fn search_businesses(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Ok(Json(Vec::<Business>::new()));
    }

    let store = state.store.clone();
    let q = query.clone();
    let candidates = tokio::task::spawn_blocking(move || store.search_businesses(&q))
        .await
        .map_err(join_error)??;

    debug!(
        "Search '{}': {} candidates before ranking",
        query,
        candidates.len()
    );

    let ranked = state.intelligence.match_businesses(&query, candidates).await;

    Ok(Json(ranked))
}
