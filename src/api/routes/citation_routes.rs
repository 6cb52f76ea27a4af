//! Citation Routes

use crate::api::handlers::citation_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

/// 创建引用路由器
pub fn create_citation_router() -> Router<AppState> {
    Router::new()
        .route("/citations", post(add_citation))
        .route("/citations/gaps", get(get_research_gaps))
        .route("/citations/:id/network", get(get_network))
        .route("/citations/:id/citing", get(get_citing))
        .route("/citations/:id/references", get(get_references))
        .route("/citations/:id/influence", get(get_influence))
}
