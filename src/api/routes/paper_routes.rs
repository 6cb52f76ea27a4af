//! Paper Routes
//!
//! 论文导入、书库管理与推荐的路由。

use crate::api::handlers::paper_handler::*;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 创建论文路由器，上传路由使用独立的请求体上限
pub fn create_paper_router(upload_max_size: usize) -> Router<AppState> {
    Router::new()
        .route("/papers", post(add_paper).get(list_papers))
        .route(
            "/papers/upload",
            post(upload_paper).layer(DefaultBodyLimit::max(upload_max_size)),
        )
        .route("/papers/recommendations", get(get_recommendations))
        .route("/papers/search", post(search_papers))
        .route("/papers/bulk", post(bulk_add))
        .route("/papers/stats/user", get(get_user_stats))
        .route(
            "/papers/:id",
            get(get_paper).put(update_paper).delete(remove_paper),
        )
        .route("/papers/:id/summary", get(get_summary))
        .route("/papers/:id/reprocess", post(reprocess_paper))
}
