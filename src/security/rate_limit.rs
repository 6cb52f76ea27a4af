//! Rate Limiting Module
//!
//! Per-client request limits with a pluggable counter store: an in-memory
//! sliding window for single-process deployments and a Redis fixed window
//! shared across API replicas.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use derive_more::Display;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::config::{BrokerConfig, SecurityConfig};
use crate::error::{AppError, Result};

/// Limit bucket. Auth endpoints get a stricter budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RateLimitScope {
    #[display("api")]
    Api,
    #[display("auth")]
    Auth,
}

/// Requests allowed per window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub requests: u32,
    pub window: Duration,
}

/// Rate limit information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Rate limit result
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Limiting disabled, or the store was unavailable
    Allowed,
    AllowedWithInfo(RateLimitInfo),
    Limited {
        /// Seconds until retry is allowed
        retry_after: u64,
        limit: RateLimitInfo,
    },
}

/// Outcome of counting one request against a window.
#[derive(Debug, Clone, Copy)]
pub struct WindowState {
    /// Requests counted in the window, including this one when admitted
    pub count: u32,
    pub admitted: bool,
    pub reset_at: DateTime<Utc>,
}

/// Counter backend.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Result<WindowState>;
}

/// Sliding window over per-client request timestamps.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    history: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Result<WindowState> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(rule.window)
            .map_err(|e| AppError::Config(e.to_string()))?;
        let cutoff = now - window;

        let mut entry = self.history.entry(key.to_string()).or_default();
        while entry.front().is_some_and(|t| *t <= cutoff) {
            entry.pop_front();
        }

        let reset_at = entry.front().map(|t| *t + window).unwrap_or(now + window);
        if entry.len() >= rule.requests as usize {
            return Ok(WindowState {
                count: entry.len() as u32,
                admitted: false,
                reset_at,
            });
        }

        entry.push_back(now);
        Ok(WindowState {
            count: entry.len() as u32,
            admitted: true,
            reset_at,
        })
    }
}

/// Fixed window counter: `INCR` + `EXPIRE` on `{prefix}:rate_limit:{scope}:{client}`.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    redis: ConnectionManager,
    prefix: String,
}

impl RedisRateLimitStore {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        Ok(Self {
            redis: crate::cache::redis::connect_manager(&config.url).await?,
            prefix: config.key_prefix.clone(),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, rule: RateLimitRule) -> Result<WindowState> {
        let mut conn = self.redis.clone();
        let key = format!("{}:rate_limit:{}", self.prefix, key);
        let window_secs = rule.window.as_secs().max(1);

        let count: u32 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;
        let ttl = if ttl > 0 { ttl } else { window_secs as i64 };

        Ok(WindowState {
            count,
            admitted: count <= rule.requests,
            reset_at: Utc::now() + chrono::Duration::seconds(ttl),
        })
    }
}

/// Rate limiter shared by the HTTP middleware.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    api_rule: RateLimitRule,
    auth_rule: RateLimitRule,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: &SecurityConfig) -> Self {
        let window = Duration::from_secs(config.rate_limit_window.max(1));
        Self {
            store,
            api_rule: RateLimitRule {
                requests: config.rate_limit_requests,
                window,
            },
            auth_rule: RateLimitRule {
                requests: config.auth_rate_limit_requests,
                window,
            },
            enabled: config.rate_limit_enabled,
        }
    }

    /// In-memory limiter.
    pub fn in_memory(config: &SecurityConfig) -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), config)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn rule(&self, scope: RateLimitScope) -> RateLimitRule {
        match scope {
            RateLimitScope::Api => self.api_rule,
            RateLimitScope::Auth => self.auth_rule,
        }
    }

    /// Count a request for `client`. Store failures let the request through.
    pub async fn check(&self, scope: RateLimitScope, client: &str) -> RateLimitResult {
        if !self.enabled {
            return RateLimitResult::Allowed;
        }

        let rule = self.rule(scope);
        let key = format!("{}:{}", scope, client);
        let state = match self.store.hit(&key, rule).await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, client = client, "Rate limit store unavailable, allowing request");
                return RateLimitResult::Allowed;
            }
        };

        let info = RateLimitInfo {
            limit: rule.requests,
            remaining: rule.requests.saturating_sub(state.count),
            reset_at: state.reset_at,
        };
        if state.admitted {
            RateLimitResult::AllowedWithInfo(info)
        } else {
            let retry_after = (state.reset_at - Utc::now()).num_seconds().max(1) as u64;
            RateLimitResult::Limited {
                retry_after,
                limit: info,
            }
        }
    }
}

/// Create the limiter matching the broker backend.
pub async fn create_rate_limiter(
    security: &SecurityConfig,
    broker: &BrokerConfig,
) -> Result<RateLimiter> {
    let store: Arc<dyn RateLimitStore> = match broker.backend.as_str() {
        "redis" => Arc::new(RedisRateLimitStore::connect(broker).await?),
        _ => Arc::new(MemoryRateLimitStore::new()),
    };
    Ok(RateLimiter::new(store, security))
}
