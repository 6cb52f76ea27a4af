//! Task Routes

use crate::api::handlers::task_handler::*;
use axum::{routing::get, Router};

use crate::api::app_state::AppState;

pub fn create_task_router() -> Router<AppState> {
    Router::new().route("/tasks/:task_id", get(get_task_status))
}
