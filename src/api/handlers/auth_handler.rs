use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use validator::Validate;

use crate::{
    api::{app_state::AppState, dto::*},
    error::AppError,
    security::CurrentUser,
};

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Registering user: {}", request.email);
    let (_, tokens) = state.auth.register(&request).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// OAuth2 password 表单登录
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.auth.login(&LoginRequest::from(form)).await?;
    Ok(Json(tokens))
}

pub async fn login_json(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let tokens = state.auth.login(&request).await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.auth.refresh(&request.refresh_token).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auth.logout(&user.0)))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auth.verify_email(&request.token).await?))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    Ok(Json(state.auth.forgot_password(&request.email).await?))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.auth.reset_password(&request).await?))
}

pub async fn me(user: CurrentUser) -> Result<impl IntoResponse, AppError> {
    Ok(Json(UserResponse::from(&user.0)))
}
