//! 进程内 Broker
//!
//! 开发模式与嵌入式 Worker 使用，语义与 Redis 后端一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::jobs::broker::{
    DEFAULT_DEAD_LETTER_MAX, JobBroker, QueueStats, RECOVERY_EXHAUSTED, dead_letter_entry,
};
use crate::jobs::job::{Job, JobResult};

/// 执行中的作业及其租约截止时间
struct Lease {
    job: Job,
    deadline: Instant,
}

#[derive(Default)]
struct QueueState {
    /// 队首为下一个出队的作业
    pending: VecDeque<Job>,
    processing: Vec<Lease>,
    delayed: Vec<(DateTime<Utc>, Job)>,
    /// 队首为最新的死信
    dead_letter: VecDeque<serde_json::Value>,
}

impl QueueState {
    fn push(&mut self, job: Job) {
        if job.priority > 0 {
            self.pending.push_front(job);
        } else {
            self.pending.push_back(job);
        }
    }

    fn promote_due(&mut self, now: DateTime<Utc>) {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|(eta, _)| *eta <= now);
        self.delayed = waiting;
        let mut due = due;
        due.sort_by_key(|(eta, _)| *eta);
        for (_, job) in due {
            self.push(job);
        }
    }

    fn take_processing(&mut self, job_id: &str) {
        self.processing.retain(|lease| lease.job.id != job_id);
    }

    fn push_dead_letter(&mut self, entry: serde_json::Value, max: usize) {
        self.dead_letter.push_front(entry);
        self.dead_letter.truncate(max);
    }
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    results: HashMap<String, (JobResult, Instant)>,
    locks: HashMap<String, (String, Instant)>,
}

impl BrokerState {
    fn queue(&mut self, name: &str) -> &mut QueueState {
        self.queues.entry(name.to_string()).or_default()
    }
}

/// 内存任务队列
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    result_ttl: Duration,
    dead_letter_max: usize,
}

impl MemoryBroker {
    pub fn new(result_ttl_secs: u64) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            result_ttl: Duration::from_secs(result_ttl_secs),
            dead_letter_max: DEFAULT_DEAD_LETTER_MAX,
        }
    }

    /// 每个队列保留的死信上限
    pub fn with_dead_letter_limit(mut self, max: usize) -> Self {
        self.dead_letter_max = max.max(1);
        self
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, job: &Job) -> Result<()> {
        self.state.lock().queue(&job.queue).push(job.clone());
        Ok(())
    }

    async fn enqueue_delayed(&self, job: &Job, eta: DateTime<Utc>) -> Result<()> {
        let mut job = job.clone();
        job.eta = Some(eta);
        self.state
            .lock()
            .queue(&job.queue.clone())
            .delayed
            .push((eta, job));
        Ok(())
    }

    async fn dequeue(&self, queues: &[String], lease: Duration) -> Result<Option<Job>> {
        let now = Utc::now();
        let deadline = Instant::now() + lease;
        let mut state = self.state.lock();
        for name in queues {
            let queue = state.queue(name);
            queue.promote_due(now);
            if let Some(job) = queue.pending.pop_front() {
                queue.processing.push(Lease {
                    job: job.clone(),
                    deadline,
                });
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &Job, result: &JobResult) -> Result<()> {
        let mut state = self.state.lock();
        state.queue(&job.queue).take_processing(&job.id);
        let now = Instant::now();
        state.results.retain(|_, (_, expires)| *expires > now);
        state
            .results
            .insert(job.id.clone(), (result.clone(), now + self.result_ttl));
        Ok(())
    }

    async fn retry(&self, job: &Job, delay: Duration) -> Result<()> {
        let eta = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        let mut delayed = job.clone();
        delayed.eta = Some(eta);

        let mut state = self.state.lock();
        let queue = state.queue(&job.queue);
        queue.take_processing(&job.id);
        queue.delayed.push((eta, delayed));
        Ok(())
    }

    async fn dead_letter(&self, job: &Job, error: &str) -> Result<()> {
        let mut state = self.state.lock();
        let queue = state.queue(&job.queue);
        queue.take_processing(&job.id);
        queue.push_dead_letter(dead_letter_entry(job, error), self.dead_letter_max);
        Ok(())
    }

    async fn recover_processing(&self, queues: &[String]) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut recovered = 0;
        for name in queues {
            let queue = state.queue(name);
            let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut queue.processing)
                .into_iter()
                .partition(|lease| lease.deadline <= now);
            queue.processing = live;

            for Lease { mut job, .. } in expired {
                // 租约中保存的是执行前的计数，这里记上中断的那次执行
                job.increment_attempts();
                if job.should_retry() {
                    queue.pending.push_front(job);
                    recovered += 1;
                } else {
                    queue.push_dead_letter(
                        dead_letter_entry(&job, RECOVERY_EXHAUSTED),
                        self.dead_letter_max,
                    );
                }
            }
        }
        Ok(recovered)
    }

    async fn result(&self, job_id: &str) -> Result<Option<JobResult>> {
        let state = self.state.lock();
        Ok(state
            .results
            .get(job_id)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(result, _)| result.clone()))
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let state = self.state.lock();
        Ok(match state.queues.get(queue) {
            Some(q) => QueueStats {
                queue: queue.to_string(),
                pending: q.pending.len(),
                processing: q.processing.len(),
                delayed: q.delayed.len(),
                dead_letter: q.dead_letter.len(),
            },
            None => QueueStats {
                queue: queue.to_string(),
                ..Default::default()
            },
        })
    }

    async fn peek_dead_letter(&self, queue: &str, limit: usize) -> Result<Vec<serde_json::Value>> {
        let state = self.state.lock();
        Ok(state
            .queues
            .get(queue)
            .map(|q| q.dead_letter.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn try_acquire_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock();
        let now = Instant::now();
        match state.locks.get(name) {
            Some((owner, expires)) if *expires > now && owner != holder => Ok(false),
            _ => {
                state
                    .locks
                    .insert(name.to_string(), (holder.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.locks.get(name).is_some_and(|(owner, _)| owner == holder) {
            state.locks.remove(name);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobOutcome;
    use serde_json::json;

    const LEASE: Duration = Duration::from_secs(600);

    fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_dequeue_respects_queue_order() {
        let broker = MemoryBroker::new(60);
        broker
            .enqueue(&Job::new("cleanup_failed_tasks", json!({})))
            .await
            .unwrap();
        broker
            .enqueue(&Job::new("process_paper", json!({"paper_id": "p1"})))
            .await
            .unwrap();

        let job = broker
            .dequeue(&queues(&["paper_processing", "default"]), LEASE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.task, "process_paper");

        let stats = broker.stats("paper_processing").await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.processing, 1);

        let result = JobResult::success(&job, json!({"ok": true}), 5);
        broker.complete(&job, &result).await.unwrap();
        assert_eq!(broker.stats("paper_processing").await.unwrap().processing, 0);

        let stored = broker.result(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.outcome, JobOutcome::Completed);
    }

    #[tokio::test]
    async fn test_priority_jobs_jump_the_queue() {
        let broker = MemoryBroker::new(60);
        broker.enqueue(&Job::new("a", json!({}))).await.unwrap();
        broker
            .enqueue(&Job::new("b", json!({})).with_priority(5))
            .await
            .unwrap();

        let job = broker.dequeue(&queues(&["default"]), LEASE).await.unwrap().unwrap();
        assert_eq!(job.task, "b");
    }

    #[tokio::test]
    async fn test_retry_is_delayed_until_eta() {
        let broker = MemoryBroker::new(60);
        let job = Job::new("process_paper", json!({}));
        broker.enqueue(&job).await.unwrap();
        let job = broker
            .dequeue(&queues(&["paper_processing"]), LEASE)
            .await
            .unwrap()
            .unwrap();

        broker.retry(&job, Duration::from_secs(3600)).await.unwrap();
        assert!(
            broker
                .dequeue(&queues(&["paper_processing"]), LEASE)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(broker.stats("paper_processing").await.unwrap().delayed, 1);

        broker.retry(&job, Duration::ZERO).await.unwrap();
        let again = broker
            .dequeue(&queues(&["paper_processing"]), LEASE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, job.id);
    }

    #[tokio::test]
    async fn test_recover_only_expired_leases() {
        let broker = MemoryBroker::new(60);
        let names = queues(&["default"]);
        let mut stranded = Job::new("stranded", json!({}));
        stranded.id = "stranded".into();
        let mut held = Job::new("held", json!({}));
        held.id = "held".into();
        broker.enqueue(&stranded).await.unwrap();
        broker.enqueue(&held).await.unwrap();

        // 第一个作业的 Worker 已经消失，租约立即过期
        broker.dequeue(&names, Duration::ZERO).await.unwrap();
        broker.dequeue(&names, LEASE).await.unwrap();

        assert_eq!(broker.recover_processing(&names).await.unwrap(), 1);
        let stats = broker.stats("default").await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);

        let again = broker.dequeue(&names, LEASE).await.unwrap().unwrap();
        assert_eq!(again.id, "stranded");
        assert_eq!(again.attempts, 1);

        assert_eq!(broker.recover_processing(&names).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recovery_dead_letters_exhausted_jobs() {
        let broker = MemoryBroker::new(60);
        let names = queues(&["default"]);
        let mut exhausted = Job::new("x", json!({})).with_max_retries(0);
        exhausted.id = "exhausted".into();
        broker.enqueue(&exhausted).await.unwrap();
        broker.dequeue(&names, Duration::ZERO).await.unwrap();

        assert_eq!(broker.recover_processing(&names).await.unwrap(), 0);
        let dead = broker.peek_dead_letter("default", 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0]["job"]["id"], "exhausted");
        assert_eq!(broker.stats("default").await.unwrap().processing, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_is_capped() {
        let broker = MemoryBroker::new(60).with_dead_letter_limit(2);
        for i in 0..5 {
            let mut job = Job::new("x", json!({}));
            job.id = format!("job-{}", i);
            broker.dead_letter(&job, "boom").await.unwrap();
        }

        let dead = broker.peek_dead_letter("default", 10).await.unwrap();
        assert_eq!(dead.len(), 2);
        assert_eq!(dead[0]["job"]["id"], "job-4");
        assert_eq!(broker.stats("default").await.unwrap().dead_letter, 2);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_renewable() {
        let broker = MemoryBroker::new(60);
        let ttl = Duration::from_secs(30);
        assert!(broker.try_acquire_lock("beat", "a", ttl).await.unwrap());
        assert!(broker.try_acquire_lock("beat", "a", ttl).await.unwrap());
        assert!(!broker.try_acquire_lock("beat", "b", ttl).await.unwrap());

        broker.release_lock("beat", "b").await.unwrap();
        assert!(!broker.try_acquire_lock("beat", "b", ttl).await.unwrap());

        broker.release_lock("beat", "a").await.unwrap();
        assert!(broker.try_acquire_lock("beat", "b", ttl).await.unwrap());
    }
}
