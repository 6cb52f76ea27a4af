//! 存储工厂模块
//!
//! 根据配置创建相应的文档存储实例。

use std::sync::Arc;
use tracing::info;

use crate::config::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::storage::memory::MemoryStore;
use crate::storage::store::DocumentStore;

#[cfg(feature = "surrealdb")]
use crate::storage::surrealdb::SurrealStore;

/// 根据配置创建存储实例
pub async fn create_document_store(config: &DatabaseConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "surrealdb")]
        "surrealdb" => Ok(Arc::new(SurrealStore::connect(config).await?)),
        #[cfg(not(feature = "surrealdb"))]
        "surrealdb" => Err(AppError::Config(
            "SurrealDB feature is not enabled. Enable 'surrealdb' feature to use it.".into(),
        )),
        other => Err(AppError::Config(format!(
            "Unknown database backend: {}",
            other
        ))),
    }
}
