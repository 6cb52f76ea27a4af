//! Scholarly - AI 科研助手后端
//!
//! 论文导入与 AI 分析、引用网络、个人知识库与检索，
//! 耗时的论文处理通过任务队列交给后台 Worker 执行。

pub mod ai;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;
