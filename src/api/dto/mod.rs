//! DTO 模块
//!
//! 数据传输对象，用于 API 请求和响应的序列化。

pub mod auth_dto;
pub mod citation_dto;
pub mod common_dto;
pub mod knowledge_dto;
pub mod paper_dto;
pub mod search_dto;
pub mod task_dto;
pub mod user_dto;

pub use auth_dto::*;
pub use citation_dto::*;
pub use common_dto::*;
pub use knowledge_dto::*;
pub use paper_dto::*;
pub use search_dto::*;
pub use task_dto::*;
pub use user_dto::*;
