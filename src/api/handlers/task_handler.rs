use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    api::{app_state::AppState, dto::TaskStatusResponse},
    error::AppError,
    security::CurrentUser,
};

/// 后台任务状态轮询
pub async fn get_task_status(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = state
        .dispatcher
        .status(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;
    Ok(Json(TaskStatusResponse::from(task)))
}
