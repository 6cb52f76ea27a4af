use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
};

/// `/search/papers` 与 `/papers/search` 等价
pub async fn search_papers(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PaperSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Paper search: {}", request.query);
    Ok(Json(state.papers.search(user.id(), &request).await?))
}

pub async fn search_knowledge(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<KnowledgeSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Knowledge search: {}", request.query);
    Ok(Json(state.knowledge.search(user.id(), &request).await?))
}

pub async fn global_search(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<GlobalSearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.search.global(user.id(), &query).await?))
}

pub async fn suggestions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SuggestionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.search.suggestions(user.id(), &query).await?))
}
