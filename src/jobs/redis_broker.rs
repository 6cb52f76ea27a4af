//! Redis Broker
//!
//! 出队脚本用 RPOPLPUSH 把作业原子地移入 processing 列表，并在 `:leases` 有序集合中
//! 登记租约截止时间（毫秒时间戳）。Worker 崩溃后作业留在 processing 中，租约过期后
//! 才会被恢复。延迟作业保存在有序集合中，score 为 ETA 毫秒时间戳。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::redis::connect_manager;
use crate::config::config::BrokerConfig;
use crate::error::Result;
use crate::jobs::broker::{JobBroker, QueueStats, RECOVERY_EXHAUSTED, dead_letter_entry};
use crate::jobs::job::{Job, JobResult};

/// 单次提升的延迟作业上限
const PROMOTE_BATCH: isize = 100;

/// 单次恢复的过期租约上限
const RECOVER_BATCH: isize = 100;

/// 出队并登记租约
const DEQUEUE_SCRIPT: &str = r#"
local data = redis.call("RPOPLPUSH", KEYS[1], KEYS[2])
if data then
    redis.call("ZADD", KEYS[3], ARGV[1], data)
end
return data
"#;

/// 交还过期租约：仅当作业仍在 processing 中时才移入目标列表。
/// ARGV[3] 为 "front" 时放到下一个出队的位置，否则放到死信列表头部并裁剪。
const RECLAIM_SCRIPT: &str = r#"
redis.call("ZREM", KEYS[2], ARGV[1])
if redis.call("LREM", KEYS[1], 1, ARGV[1]) == 0 then
    return 0
end
if ARGV[3] == "front" then
    redis.call("RPUSH", KEYS[3], ARGV[2])
else
    redis.call("LPUSH", KEYS[3], ARGV[2])
    redis.call("LTRIM", KEYS[3], 0, tonumber(ARGV[4]) - 1)
end
return 1
"#;

/// 续期：仅当锁仍属于 holder 时延长 TTL
const RENEW_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// 释放：仅当锁仍属于 holder 时删除
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis 任务队列
#[derive(Clone)]
pub struct RedisBroker {
    /// 队列连接（自动重连）
    redis: ConnectionManager,
    /// 结果后端连接
    results: ConnectionManager,
    prefix: String,
    result_ttl: u64,
    dead_letter_max: usize,
}

impl RedisBroker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let redis = connect_manager(&config.url).await?;
        let results = if config.result_backend_url() == config.url {
            redis.clone()
        } else {
            connect_manager(config.result_backend_url()).await?
        };
        Ok(Self {
            redis,
            results,
            prefix: config.key_prefix.clone(),
            result_ttl: config.result_ttl,
            dead_letter_max: config.dead_letter_max.max(1),
        })
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue)
    }

    fn processing_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:processing", self.prefix, queue)
    }

    fn leases_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:leases", self.prefix, queue)
    }

    fn delayed_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:delayed", self.prefix, queue)
    }

    fn dead_letter_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:dead_letter", self.prefix, queue)
    }

    fn result_key(&self, job_id: &str) -> String {
        format!("{}:result:{}", self.prefix, job_id)
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.prefix, name)
    }

    /// 把到期的延迟作业移入待执行列表
    async fn promote_due(&self, queue: &str) -> Result<usize> {
        let mut conn = self.redis.clone();
        let delayed_key = self.delayed_key(queue);
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(&delayed_key, "-inf", now, 0, PROMOTE_BATCH)
            .await?;

        let mut promoted = 0;
        for data in due {
            // ZREM 返回 1 的 Worker 才负责入队，避免重复提升
            let removed: usize = conn.zrem(&delayed_key, &data).await?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(self.queue_key(queue), &data).await?;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(queue = queue, promoted = promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    /// 按 ID 从 processing 列表移除作业并释放租约
    async fn remove_from_processing(&self, job: &Job) -> Result<()> {
        let mut conn = self.redis.clone();
        let processing_key = self.processing_key(&job.queue);
        let entries: Vec<String> = conn.lrange(&processing_key, 0, -1).await?;

        for data in entries {
            if let Ok(candidate) = serde_json::from_str::<Job>(&data) {
                if candidate.id == job.id {
                    redis::pipe()
                        .atomic()
                        .lrem(&processing_key, 1, &data)
                        .zrem(self.leases_key(&job.queue), &data)
                        .query_async::<_, ()>(&mut conn)
                        .await?;
                    return Ok(());
                }
            }
        }

        // 已被移除不视为错误
        Ok(())
    }

    /// 交还一个过期租约，返回作业是否仍由本次调用取回
    async fn reclaim(
        &self,
        queue: &str,
        data: &str,
        target: &str,
        moved: &str,
        front: bool,
    ) -> Result<bool> {
        let mut conn = self.redis.clone();
        let reclaimed: i64 = redis::Script::new(RECLAIM_SCRIPT)
            .key(self.processing_key(queue))
            .key(self.leases_key(queue))
            .key(target)
            .arg(data)
            .arg(moved)
            .arg(if front { "front" } else { "dead_letter" })
            .arg(self.dead_letter_max)
            .invoke_async(&mut conn)
            .await?;
        Ok(reclaimed == 1)
    }
}

#[async_trait]
impl JobBroker for RedisBroker {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, job: &Job) -> Result<()> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();
        // 从右侧出队，高优先级作业放在右侧
        if job.priority > 0 {
            conn.rpush::<_, _, ()>(self.queue_key(&job.queue), serialized)
                .await?;
        } else {
            conn.lpush::<_, _, ()>(self.queue_key(&job.queue), serialized)
                .await?;
        }
        Ok(())
    }

    async fn enqueue_delayed(&self, job: &Job, eta: DateTime<Utc>) -> Result<()> {
        let mut job = job.clone();
        job.eta = Some(eta);
        let serialized = serde_json::to_string(&job)?;
        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(
            self.delayed_key(&job.queue),
            serialized,
            eta.timestamp_millis(),
        )
        .await?;
        Ok(())
    }

    async fn dequeue(&self, queues: &[String], lease: Duration) -> Result<Option<Job>> {
        let mut conn = self.redis.clone();
        for queue in queues {
            self.promote_due(queue).await?;

            let deadline = Utc::now().timestamp_millis() + lease.as_millis() as i64;
            let data: Option<String> = redis::Script::new(DEQUEUE_SCRIPT)
                .key(self.queue_key(queue))
                .key(self.processing_key(queue))
                .key(self.leases_key(queue))
                .arg(deadline)
                .invoke_async(&mut conn)
                .await?;

            if let Some(data) = data {
                match serde_json::from_str::<Job>(&data) {
                    Ok(job) => return Ok(Some(job)),
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Dropping malformed job");
                        redis::pipe()
                            .atomic()
                            .lrem(self.processing_key(queue), 1, &data)
                            .zrem(self.leases_key(queue), &data)
                            .query_async::<_, ()>(&mut conn)
                            .await?;
                    }
                }
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &Job, result: &JobResult) -> Result<()> {
        let serialized = serde_json::to_string(result)?;
        let mut results = self.results.clone();
        results
            .set_ex::<_, _, ()>(self.result_key(&job.id), serialized, self.result_ttl)
            .await?;
        self.remove_from_processing(job).await
    }

    async fn retry(&self, job: &Job, delay: Duration) -> Result<()> {
        self.remove_from_processing(job).await?;
        let eta = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.enqueue_delayed(job, eta).await
    }

    async fn dead_letter(&self, job: &Job, error: &str) -> Result<()> {
        self.remove_from_processing(job).await?;
        let serialized = serde_json::to_string(&dead_letter_entry(job, error))?;
        let key = self.dead_letter_key(&job.queue);
        let mut conn = self.redis.clone();
        redis::pipe()
            .atomic()
            .lpush(&key, serialized)
            .ltrim(&key, 0, self.dead_letter_max as isize - 1)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover_processing(&self, queues: &[String]) -> Result<usize> {
        let mut conn = self.redis.clone();
        let now = Utc::now().timestamp_millis();
        let mut recovered = 0;

        for queue in queues {
            let leases_key = self.leases_key(queue);
            let expired: Vec<String> = conn
                .zrangebyscore_limit(&leases_key, "-inf", now, 0, RECOVER_BATCH)
                .await?;

            for data in expired {
                let Ok(mut job) = serde_json::from_str::<Job>(&data) else {
                    conn.zrem::<_, _, ()>(&leases_key, &data).await?;
                    continue;
                };
                // processing 中保存的是执行前的计数，这里记上中断的那次执行
                job.increment_attempts();

                if job.should_retry() {
                    let moved = serde_json::to_string(&job)?;
                    if self.reclaim(queue, &data, &self.queue_key(queue), &moved, true).await? {
                        recovered += 1;
                    }
                } else {
                    let moved =
                        serde_json::to_string(&dead_letter_entry(&job, RECOVERY_EXHAUSTED))?;
                    self.reclaim(queue, &data, &self.dead_letter_key(queue), &moved, false)
                        .await?;
                }
            }
        }

        Ok(recovered)
    }

    async fn result(&self, job_id: &str) -> Result<Option<JobResult>> {
        let mut results = self.results.clone();
        let data: Option<String> = results.get(self.result_key(job_id)).await?;
        match data {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let mut conn = self.redis.clone();
        let (pending, processing, delayed, dead_letter): (usize, usize, usize, usize) =
            redis::pipe()
                .llen(self.queue_key(queue))
                .llen(self.processing_key(queue))
                .zcard(self.delayed_key(queue))
                .llen(self.dead_letter_key(queue))
                .query_async(&mut conn)
                .await?;

        Ok(QueueStats {
            queue: queue.to_string(),
            pending,
            processing,
            delayed,
            dead_letter,
        })
    }

    async fn peek_dead_letter(&self, queue: &str, limit: usize) -> Result<Vec<serde_json::Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let data: Vec<String> = conn
            .lrange(self.dead_letter_key(queue), 0, limit as isize - 1)
            .await?;
        data.iter()
            .map(|s| serde_json::from_str(s).map_err(Into::into))
            .collect()
    }

    async fn try_acquire_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.redis.clone();
        let key = self.lock_key(name);
        let ttl_ms = ttl.as_millis() as u64;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        if acquired.is_some() {
            return Ok(true);
        }

        let renewed: i64 = redis::Script::new(RENEW_LOCK_SCRIPT)
            .key(&key)
            .arg(holder)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(self.lock_key(name))
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
