use axum::{Json, extract::State, response::IntoResponse};

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
};

pub async fn get_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.profile(&user.0).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.update_profile(&user.0, &request).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.change_password(&user.0, &request).await?))
}

pub async fn get_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.stats(&user.0).await?))
}

/// 停用账号（软删除）
pub async fn deactivate_account(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.deactivate(&user.0).await?))
}
