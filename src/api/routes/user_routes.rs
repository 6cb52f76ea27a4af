//! User Routes

use crate::api::handlers::user_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 创建用户路由器
pub fn create_user_router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/me",
            get(get_profile).put(update_profile).delete(deactivate_account),
        )
        .route("/users/me/change-password", post(change_password))
        .route("/users/me/stats", get(get_stats))
}
