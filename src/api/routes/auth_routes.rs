//! Auth Routes
//!
//! 注册、登录与令牌相关的路由。`/me` 与 `/logout` 需要认证，其余公开。

use crate::api::handlers::auth_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 公开的认证路由
pub fn create_auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/login-json", post(login_json))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

/// 需要登录的认证路由
pub fn create_session_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}
