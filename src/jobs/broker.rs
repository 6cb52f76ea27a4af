//! 任务队列 Broker 抽象
//!
//! 每个队列由四个结构组成：
//!
//! - `{queue}`: 待执行列表
//! - `{queue}:processing`: 执行中的作业（用于崩溃恢复）
//! - `{queue}:delayed`: 延迟作业（按 ETA 排序）
//! - `{queue}:dead_letter`: 超过重试次数的作业（有上限）
//!
//! 出队时先把到期的延迟作业提升到待执行列表，再把一个作业原子地移入 processing，
//! 同时登记租约截止时间。多个 Worker 副本共享同一组列表，恢复只处理租约已过期的作业，
//! 存活副本手中的作业不受影响。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::config::BrokerConfig;
use crate::error::{AppError, Result};
use crate::jobs::job::{Job, JobResult};
use crate::jobs::memory_broker::MemoryBroker;
use crate::jobs::redis_broker::RedisBroker;

/// 每个队列默认保留的死信数量
pub const DEFAULT_DEAD_LETTER_MAX: usize = 1000;

/// 租约过期且重试耗尽时的死信原因
pub const RECOVERY_EXHAUSTED: &str = "Worker lease expired after max attempts";

/// 队列统计
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub pending: usize,
    pub processing: usize,
    pub delayed: usize,
    pub dead_letter: usize,
}

impl QueueStats {
    pub fn total_jobs(&self) -> usize {
        self.pending + self.processing + self.delayed + self.dead_letter
    }
}

/// 任务队列后端
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// 后端名称
    fn backend(&self) -> &'static str;

    /// 立即入队
    async fn enqueue(&self, job: &Job) -> Result<()>;

    /// 延迟到 eta 之后入队
    async fn enqueue_delayed(&self, job: &Job, eta: DateTime<Utc>) -> Result<()>;

    /// 按顺序从第一个非空队列取出一个作业，移入其 processing 列表并持有 `lease` 时长的租约
    async fn dequeue(&self, queues: &[String], lease: Duration) -> Result<Option<Job>>;

    /// 作业完成：移出 processing 并保存结果
    async fn complete(&self, job: &Job, result: &JobResult) -> Result<()>;

    /// 作业重试：移出 processing，延迟 delay 后重新入队
    async fn retry(&self, job: &Job, delay: Duration) -> Result<()>;

    /// 作业进入死信队列，超出上限时丢弃最旧的条目
    async fn dead_letter(&self, job: &Job, error: &str) -> Result<()>;

    /// 把租约已过期的执行中作业放回待执行列表（重试耗尽则进入死信），返回恢复数量
    async fn recover_processing(&self, queues: &[String]) -> Result<usize>;

    /// 读取作业结果
    async fn result(&self, job_id: &str) -> Result<Option<JobResult>>;

    /// 队列统计
    async fn stats(&self, queue: &str) -> Result<QueueStats>;

    /// 查看死信队列（不移除）
    async fn peek_dead_letter(&self, queue: &str, limit: usize) -> Result<Vec<serde_json::Value>>;

    /// 获取或续期分布式锁，已由 holder 持有时同样返回 true
    async fn try_acquire_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// 释放锁（仅持有者可释放）
    async fn release_lock(&self, name: &str, holder: &str) -> Result<()>;

    /// 连通性检查
    async fn ping(&self) -> Result<()>;
}

/// 死信条目
pub fn dead_letter_entry(job: &Job, error: &str) -> serde_json::Value {
    serde_json::json!({
        "job": job,
        "error": error,
        "moved_at": Utc::now().to_rfc3339(),
    })
}

/// 根据配置创建 Broker
pub async fn create_broker(config: &BrokerConfig) -> Result<Arc<dyn JobBroker>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(
            MemoryBroker::new(config.result_ttl).with_dead_letter_limit(config.dead_letter_max),
        )),
        "redis" => Ok(Arc::new(RedisBroker::connect(config).await?)),
        other => Err(AppError::Config(format!("Unknown broker backend: {}", other))),
    }
}
