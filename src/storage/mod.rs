//! 存储层模块
//!
//! 提供文档持久化服务，支持内存与 SurrealDB 两种后端。

pub mod factory;
pub mod memory;
pub mod store;

#[cfg(feature = "surrealdb")]
pub mod surrealdb;

pub use factory::create_document_store;
pub use memory::MemoryStore;
pub use store::{Collection, Condition, DocumentStore, Filter, Record, SortOrder};
