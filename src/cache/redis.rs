use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::Cache;
use crate::config::config::BrokerConfig;
use crate::error::{AppError, Result};

/// 建立自动重连的 Redis 连接
pub async fn connect_manager(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).map_err(|e| AppError::Config(e.to_string()))?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::Connection(format!("Redis connection failed: {}", e)))
}

/// Redis 缓存，键统一加前缀
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        Ok(Self {
            redis: connect_manager(&config.url).await?,
            prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:cache:{}", self.prefix, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.clone();
        Ok(conn.get(self.key(key)).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }
}
