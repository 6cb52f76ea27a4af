//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod auth_handler;
pub mod citation_handler;
pub mod knowledge_handler;
pub mod monitoring_handler;
pub mod paper_handler;
pub mod search_handler;
pub mod task_handler;
pub mod user_handler;
