//! Knowledge Routes
//!
//! 知识库条目的增删改查、检索与关联推荐。

use crate::api::handlers::knowledge_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 创建知识库路由器
pub fn create_knowledge_router() -> Router<AppState> {
    Router::new()
        .route("/knowledge", get(list_entries).post(create_entry))
        .route("/knowledge/search", post(search_entries))
        .route("/knowledge/stats", get(get_stats))
        .route(
            "/knowledge/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/knowledge/:id/related", get(get_related))
}
