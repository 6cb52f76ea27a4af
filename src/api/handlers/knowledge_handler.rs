use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
    services::knowledge::RELATED_LIMIT,
};

const MAX_RELATED: usize = 20;

pub async fn list_entries(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<KnowledgeListQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.list(user.id(), &query).await?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateKnowledgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.knowledge.create(user.id(), &request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_entry(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.get(user.id(), &id).await?))
}

pub async fn update_entry(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateKnowledgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.update(user.id(), &id, &request).await?))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.delete(user.id(), &id).await?))
}

pub async fn search_entries(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<KnowledgeSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.search(user.id(), &request).await?))
}

pub async fn get_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.knowledge.stats(user.id()).await?))
}

pub async fn get_related(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.resolve(RELATED_LIMIT, MAX_RELATED);
    Ok(Json(state.knowledge.related(user.id(), &id, limit).await?))
}
