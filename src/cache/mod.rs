//! 缓存模块
//!
//! 推荐结果缓存与维护模式开关共用的键值缓存，支持内存与 Redis 两种后端。

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::config::BrokerConfig;
use crate::error::{AppError, Result};

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// 维护模式开关的缓存键
pub const MAINTENANCE_KEY: &str = "maintenance_mode";

/// 键值缓存
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入并设置过期时间
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// 根据 Broker 配置创建缓存（与 Broker 共用同一个 Redis）
pub async fn create_cache(config: &BrokerConfig) -> Result<Arc<dyn Cache>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new())),
        "redis" => Ok(Arc::new(RedisCache::connect(config).await?)),
        other => Err(AppError::Config(format!("Unknown cache backend: {}", other))),
    }
}
