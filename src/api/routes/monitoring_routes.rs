//! Monitoring Routes
//!
//! 系统状态与维护模式开关，仅机构用户可用。

use crate::api::handlers::monitoring_handler::*;
use axum::{
    routing::{get, post},
    Router,
};

use crate::api::app_state::AppState;

pub fn create_monitoring_router() -> Router<AppState> {
    Router::new()
        .route("/monitoring/status", get(system_status))
        .route("/monitoring/maintenance", post(set_maintenance))
}
