use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::BytesRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
};

/// 推荐默认条数
const DEFAULT_RECOMMENDATIONS: usize = 10;

const MAX_RECOMMENDATIONS: usize = 20;

pub async fn add_paper(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<AddPaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Adding paper from {}", request.url);
    let response = state.papers.add_paper(user.id(), &request).await?;
    let status = if response.is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// 上传校验：请求体为文件原始内容，文件名通过查询参数传入
pub async fn upload_paper(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<UploadQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(format!(
            "File too large. Maximum size: {} bytes",
            state.config.sources.upload_max_size
        )),
        _ => AppError::Validation(rejection.body_text()),
    })?;
    let response = state.papers.validate_upload(&query.filename, body.len())?;
    Ok(Json(response))
}

pub async fn list_papers(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<LibraryQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.list_library(user.id(), &query).await?))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.resolve(DEFAULT_RECOMMENDATIONS, MAX_RECOMMENDATIONS);
    Ok(Json(state.papers.recommendations(user.id(), limit).await?))
}

pub async fn search_papers(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PaperSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.search(user.id(), &request).await?))
}

pub async fn bulk_add(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<BulkAddRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.bulk_add(user.id(), &request).await?))
}

pub async fn get_user_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.user_stats(user.id()).await?))
}

pub async fn get_paper(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.get_library_paper(user.id(), &id).await?))
}

pub async fn update_paper(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateLibraryEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .papers
            .update_library_entry(user.id(), &id, &request)
            .await?,
    ))
}

pub async fn remove_paper(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.remove_from_library(user.id(), &id).await?))
}

pub async fn get_summary(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.papers.summary(user.id(), &id).await?))
}

pub async fn reprocess_paper(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.papers.reprocess(user.id(), &id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
