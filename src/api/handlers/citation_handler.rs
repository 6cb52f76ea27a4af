use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
};

/// 施引/参考文献列表默认条数
const DEFAULT_LINKS: usize = 50;

const MAX_LINKS: usize = 200;

pub async fn get_network(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> Result<impl IntoResponse, AppError> {
    debug!(
        "Building citation network for {}: depth={}, max_papers={}",
        id, query.depth, query.max_papers
    );
    let network = state
        .citations
        .build_citation_network(&id, query.depth, query.max_papers)
        .await?;
    Ok(Json(network))
}

pub async fn get_citing(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.resolve(DEFAULT_LINKS, MAX_LINKS);
    Ok(Json(state.citations.citing_papers(&id, limit).await?))
}

pub async fn get_references(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.resolve(DEFAULT_LINKS, MAX_LINKS);
    Ok(Json(state.citations.referenced_papers(&id, limit).await?))
}

pub async fn get_influence(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.citations.influence_metrics(&id).await?))
}

pub async fn add_citation(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(request): Json<AddCitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let citation = state.citations.add_citation(&request).await?;
    Ok((StatusCode::CREATED, Json(citation)))
}

pub async fn get_research_gaps(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.citations.research_gaps(user.id()).await?))
}
