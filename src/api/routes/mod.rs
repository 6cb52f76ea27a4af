//! Routes 模块
//!
//! 定义 API 路由。

pub mod auth_routes;
pub mod citation_routes;
pub mod knowledge_routes;
pub mod monitoring_routes;
pub mod paper_routes;
pub mod search_routes;
pub mod task_routes;
pub mod user_routes;
