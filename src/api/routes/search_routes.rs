//! Search Routes
//!
//! 定义搜索相关的 API 路由。

use crate::api::handlers::search_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 创建搜索路由器
pub fn create_search_router() -> Router<AppState> {
    Router::new()
        .route("/search/papers", post(search_papers))
        .route("/search/knowledge", post(search_knowledge))
        .route("/search/global", get(global_search))
        .route("/search/suggestions", get(suggestions))
}
