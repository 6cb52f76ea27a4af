//! Worker 池
//!
//! 固定数量的 Worker 共享一个广播停机信号，从配置的队列中拉取作业执行：
//!
//! - 每个作业出队时持有“硬超时 + 宽限期”的租约，存活的 Worker 一定在租约内完成或交还作业
//! - 启动时及之后定期把租约已过期（Worker 已消失）的作业放回队列
//! - 软超时只记录告警，硬超时中止任务并按重试策略处理
//! - 可重试错误按指数退避重新入队，重试耗尽进入死信队列
//! - 未知任务直接进入死信队列

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::config::WorkerConfig;
use crate::error::{AppError, Result};
use crate::jobs::broker::JobBroker;
use crate::jobs::job::{Job, JobOutcome, JobResult};
use crate::jobs::tasks::TaskHandler;
use crate::jobs::tracker::TaskTracker;
use crate::observability::AppMetrics;

/// 队列深度上报与过期租约回收间隔
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15);

/// 租约在硬超时之外的宽限期，覆盖结果写回的时间
const LEASE_GRACE: Duration = Duration::from_secs(30);

/// Worker 池统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub workers: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
}

impl PoolStats {
    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.processed as f64 * 100.0
    }
}

#[derive(Default)]
struct SharedPoolStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    timed_out: AtomicU64,
}

impl SharedPoolStats {
    fn snapshot(&self, workers: usize) -> PoolStats {
        PoolStats {
            workers,
            processed: self.processed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
        }
    }
}

/// 单次执行的结果
enum Execution {
    Finished(Result<Value>),
    TimedOut,
}

/// Worker 共享的依赖
#[derive(Clone)]
struct WorkerContext {
    broker: Arc<dyn JobBroker>,
    tracker: TaskTracker,
    handler: Arc<dyn TaskHandler>,
    metrics: Arc<AppMetrics>,
    stats: Arc<SharedPoolStats>,
    queues: Vec<String>,
    poll_interval: Duration,
    soft_limit: Duration,
    hard_limit: Duration,
    lease: Duration,
    backoff_base: u64,
}

impl WorkerContext {
    async fn recover_expired(&self) {
        match self.broker.recover_processing(&self.queues).await {
            Ok(recovered) if recovered > 0 => {
                info!(recovered = recovered, "Recovered jobs with expired leases")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to recover processing jobs"),
        }
    }
}

pub struct WorkerPool {
    config: WorkerConfig,
    context: WorkerContext,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    is_running: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn JobBroker>,
        tracker: TaskTracker,
        handler: Arc<dyn TaskHandler>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let hard_limit = Duration::from_secs(config.hard_time_limit.max(config.soft_time_limit));
        let context = WorkerContext {
            broker,
            tracker,
            handler,
            metrics,
            stats: Arc::new(SharedPoolStats::default()),
            queues: config.queues.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            soft_limit: Duration::from_secs(config.soft_time_limit),
            hard_limit,
            lease: hard_limit + LEASE_GRACE,
            backoff_base: config.retry_backoff_base,
        };
        Self {
            config,
            context,
            shutdown_tx,
            handles: Vec::new(),
            is_running: AtomicBool::new(false),
        }
    }

    /// 启动 Worker 与队列深度上报
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(AppError::Internal("Worker pool is already running".into()));
        }

        self.context.recover_expired().await;

        for i in 0..self.config.concurrency.max(1) {
            let worker = Worker {
                id: format!("worker-{}", i),
                context: self.context.clone(),
                shutdown_rx: self.shutdown_tx.subscribe(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }
        self.handles.push(tokio::spawn(maintain_queues(
            self.context.clone(),
            self.shutdown_tx.subscribe(),
        )));

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            concurrency = self.config.concurrency,
            queues = ?self.context.queues,
            "Worker pool started"
        );
        Ok(())
    }

    /// 发送停机信号并等待 Worker 完成当前作业
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(());

        let timeout = Duration::from_secs(self.config.shutdown_timeout);
        let handles: Vec<JoinHandle<()>> = self.handles.drain(..).collect();
        let wait = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => {
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(AppError::Timeout(format!(
                "Worker pool shutdown timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.context.stats.snapshot(self.config.concurrency.max(1))
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

async fn maintain_queues(context: WorkerContext, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // 第一次 tick 立即触发，启动时已回收过一次
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                context.recover_expired().await;
                for queue in &context.queues {
                    match context.broker.stats(queue).await {
                        Ok(stats) => context.metrics.set_queue_depth(queue, stats.pending + stats.delayed),
                        Err(e) => debug!(queue = %queue, error = %e, "Failed to read queue stats"),
                    }
                }
            }
        }
    }
}

struct Worker {
    id: String,
    context: WorkerContext,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Worker {
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");
        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => break,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self
                .context
                .broker
                .dequeue(&self.context.queues, self.context.lease)
                .await
            {
                Ok(Some(job)) => process_job(&self.context, &self.id, job).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.context.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                    tokio::time::sleep(self.context.poll_interval).await;
                }
            }
        }
        info!(worker_id = %self.id, "Worker stopped");
    }
}

/// 在软/硬超时约束下执行一个作业
async fn execute(context: &WorkerContext, worker_id: &str, job: &Job) -> Execution {
    let work = context.handler.handle(job);
    tokio::pin!(work);
    let soft = tokio::time::sleep(context.soft_limit);
    tokio::pin!(soft);

    let limited = tokio::time::timeout(context.hard_limit, async {
        tokio::select! {
            result = work.as_mut() => return result,
            _ = soft.as_mut() => {
                warn!(
                    worker_id = worker_id,
                    job_id = %job.id,
                    task = %job.task,
                    soft_limit_secs = context.soft_limit.as_secs(),
                    "Task exceeded soft time limit"
                );
            }
        }
        work.as_mut().await
    })
    .await;

    match limited {
        Ok(result) => Execution::Finished(result),
        Err(_) => Execution::TimedOut,
    }
}

async fn process_job(context: &WorkerContext, worker_id: &str, mut job: Job) {
    let started = Instant::now();
    // 只计本次执行，processing 中的副本保持执行前的计数
    job.increment_attempts();
    context.stats.processed.fetch_add(1, Ordering::SeqCst);

    info!(
        worker_id = worker_id,
        job_id = %job.id,
        task = %job.task,
        attempt = job.attempts,
        "Processing job"
    );

    if !context.handler.handles(&job.task) {
        let message = format!("Unknown task: {}", job.task);
        error!(worker_id = worker_id, job_id = %job.id, "{}", message);
        fail(context, &job, &message, true).await;
        return;
    }

    if let Err(e) = context.tracker.started(&job).await {
        warn!(job_id = %job.id, error = %e, "Failed to mark task as running");
    }
    context.metrics.job_started();
    let execution = execute(context, worker_id, &job).await;
    context.metrics.job_finished();

    let elapsed = started.elapsed();
    context
        .metrics
        .observe_job_duration(&job.task, elapsed.as_secs_f64());

    match execution {
        Execution::Finished(Ok(output)) => {
            let result = JobResult::success(&job, output.clone(), elapsed.as_millis() as u64);
            if let Err(e) = context.broker.complete(&job, &result).await {
                error!(job_id = %job.id, error = %e, "Failed to mark job complete");
            }
            if let Err(e) = context.tracker.completed(&job, output).await {
                warn!(job_id = %job.id, error = %e, "Failed to mark task as completed");
            }
            context.stats.succeeded.fetch_add(1, Ordering::SeqCst);
            context.metrics.record_job(&job.task, "completed");
            info!(
                worker_id = worker_id,
                job_id = %job.id,
                duration_ms = elapsed.as_millis() as u64,
                "Job completed successfully"
            );
        }
        Execution::Finished(Err(e)) => {
            let message = e.to_string();
            if e.is_retryable() && job.should_retry() {
                retry(context, &job, &message).await;
            } else if e.is_retryable() {
                fail(context, &job, &message, true).await;
            } else {
                warn!(worker_id = worker_id, job_id = %job.id, error = %message, "Job failed");
                let result = JobResult::failure(&job, JobOutcome::Failed, &message, elapsed.as_millis() as u64);
                if let Err(e) = context.broker.complete(&job, &result).await {
                    error!(job_id = %job.id, error = %e, "Failed to store job result");
                }
                fail(context, &job, &message, false).await;
            }
        }
        Execution::TimedOut => {
            context.stats.timed_out.fetch_add(1, Ordering::SeqCst);
            context.metrics.record_job(&job.task, "timeout");
            let message = format!(
                "Task exceeded hard time limit of {}s",
                context.hard_limit.as_secs()
            );
            if job.should_retry() {
                retry(context, &job, &message).await;
            } else {
                fail(context, &job, &message, true).await;
            }
        }
    }
}

async fn retry(context: &WorkerContext, job: &Job, error: &str) {
    let delay = job.retry_delay(context.backoff_base);
    warn!(
        job_id = %job.id,
        task = %job.task,
        error = error,
        remaining_attempts = job.remaining_attempts(),
        delay_secs = delay.as_secs(),
        "Job failed, scheduling retry"
    );
    if let Err(e) = context.broker.retry(job, delay).await {
        error!(job_id = %job.id, error = %e, "Failed to requeue job");
    }
    if let Err(e) = context.tracker.retrying(job, error).await {
        warn!(job_id = %job.id, error = %e, "Failed to mark task as retrying");
    }
    context.stats.retried.fetch_add(1, Ordering::SeqCst);
    context.metrics.record_job(&job.task, "retrying");
}

/// 最终失败：记录状态，可选进入死信队列
async fn fail(context: &WorkerContext, job: &Job, error: &str, dead_letter: bool) {
    if dead_letter {
        error!(job_id = %job.id, task = %job.task, error = error, "Moving job to dead letter queue");
        if let Err(e) = context.broker.dead_letter(job, error).await {
            error!(job_id = %job.id, error = %e, "Failed to move job to dead letter queue");
        }
    }
    if let Err(e) = context.tracker.failed(job, error).await {
        warn!(job_id = %job.id, error = %e, "Failed to mark task as failed");
    }
    context.handler.on_failed(job, error).await;
    context.stats.failed.fetch_add(1, Ordering::SeqCst);
    context.metrics.record_job(&job.task, "failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::memory_broker::MemoryBroker;
    use crate::models::TaskStatus;
    use crate::storage::{DocumentStore, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// 按任务名称决定行为的测试执行器
    #[derive(Default)]
    struct ScriptedHandler {
        failed: Mutex<Vec<String>>,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for ScriptedHandler {
        fn handles(&self, task: &str) -> bool {
            task != "unknown"
        }

        async fn handle(&self, job: &Job) -> Result<Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match job.task.as_str() {
                "ok" => Ok(json!({"echo": job.payload})),
                "nap" => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(Value::Null)
                }
                "flaky" => Err(AppError::Upstream("503".into())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                }
                _ => Err(AppError::Validation("bad input".into())),
            }
        }

        async fn on_failed(&self, job: &Job, _error: &str) {
            self.failed.lock().push(job.id.clone());
        }
    }

    struct Harness {
        broker: Arc<dyn JobBroker>,
        tracker: TaskTracker,
        handler: Arc<ScriptedHandler>,
        pool: WorkerPool,
    }

    fn pool(
        broker: &Arc<dyn JobBroker>,
        tracker: &TaskTracker,
        handler: &Arc<ScriptedHandler>,
        hard_limit: u64,
    ) -> WorkerPool {
        let config = WorkerConfig {
            concurrency: 1,
            queues: vec!["default".into()],
            poll_interval_ms: 10,
            soft_time_limit: 0,
            hard_time_limit: hard_limit,
            max_retries: 1,
            retry_backoff_base: 0,
            shutdown_timeout: 5,
            embedded: false,
        };
        WorkerPool::new(
            config,
            broker.clone(),
            tracker.clone(),
            handler.clone(),
            Arc::new(AppMetrics::new().unwrap()),
        )
    }

    fn harness(hard_limit: u64) -> Harness {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let broker: Arc<dyn JobBroker> = Arc::new(MemoryBroker::new(60));
        let tracker = TaskTracker::new(store);
        let handler = Arc::new(ScriptedHandler::default());
        let pool = pool(&broker, &tracker, &handler, hard_limit);
        Harness {
            broker,
            tracker,
            handler,
            pool,
        }
    }

    async fn submit(h: &Harness, task: &str, max_retries: u32) -> Job {
        let job = Job::new(task, json!({"n": 1})).with_max_retries(max_retries);
        h.tracker.created(&job).await.unwrap();
        h.broker.enqueue(&job).await.unwrap();
        job
    }

    async fn wait_for_status(h: &Harness, job: &Job, status: TaskStatus) {
        for _ in 0..200 {
            if let Some(task) = h.tracker.get(&job.id).await.unwrap() {
                if task.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached {:?}", job.id, status);
    }

    #[test]
    fn test_success_rate() {
        let stats = PoolStats {
            processed: 4,
            succeeded: 3,
            ..Default::default()
        };
        assert_eq!(stats.success_rate(), 75.0);
        assert_eq!(PoolStats::default().success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_completes_jobs_and_stores_results() {
        let mut h = harness(5);
        let job = submit(&h, "ok", 1).await;
        h.pool.start().await.unwrap();

        wait_for_status(&h, &job, TaskStatus::Completed).await;
        let result = h.broker.result(&job.id).await.unwrap().unwrap();
        assert!(result.is_success());

        h.pool.shutdown().await.unwrap();
        assert!(!h.pool.is_running());
        assert_eq!(h.pool.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_retryable_errors_end_in_dead_letter() {
        let mut h = harness(5);
        let job = submit(&h, "flaky", 1).await;
        h.pool.start().await.unwrap();

        wait_for_status(&h, &job, TaskStatus::Failed).await;
        h.pool.shutdown().await.unwrap();

        let stats = h.pool.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(h.broker.peek_dead_letter("default", 10).await.unwrap().len(), 1);
        assert_eq!(h.handler.failed.lock().as_slice(), &[job.id.clone()]);
    }

    #[tokio::test]
    async fn test_validation_errors_fail_without_retry() {
        let mut h = harness(5);
        let job = submit(&h, "invalid", 3).await;
        h.pool.start().await.unwrap();

        wait_for_status(&h, &job, TaskStatus::Failed).await;
        h.pool.shutdown().await.unwrap();

        assert_eq!(h.pool.stats().retried, 0);
        assert!(h.broker.peek_dead_letter("default", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_goes_to_dead_letter() {
        let mut h = harness(5);
        let job = submit(&h, "unknown", 3).await;
        h.pool.start().await.unwrap();

        wait_for_status(&h, &job, TaskStatus::Failed).await;
        h.pool.shutdown().await.unwrap();
        assert_eq!(h.broker.peek_dead_letter("default", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hard_time_limit() {
        let mut h = harness(1);
        let job = submit(&h, "slow", 0).await;
        h.pool.start().await.unwrap();

        for _ in 0..300 {
            if h.pool.stats().timed_out == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        wait_for_status(&h, &job, TaskStatus::Failed).await;
        h.pool.shutdown().await.unwrap();
        assert_eq!(h.pool.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut h = harness(5);
        h.pool.start().await.unwrap();
        assert!(h.pool.start().await.is_err());
        h.pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_pool_leaves_inflight_job_alone() {
        let mut h = harness(5);
        let job = submit(&h, "nap", 3).await;
        h.pool.start().await.unwrap();
        wait_for_status(&h, &job, TaskStatus::Running).await;

        let mut replica = pool(&h.broker, &h.tracker, &h.handler, 5);
        replica.start().await.unwrap();

        wait_for_status(&h, &job, TaskStatus::Completed).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.pool.shutdown().await.unwrap();
        replica.shutdown().await.unwrap();

        assert_eq!(h.handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(replica.stats().processed, 0);
        assert_eq!(h.tracker.get(&job.id).await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_job_of_dead_worker_is_recovered() {
        let mut h = harness(5);
        let job = submit(&h, "ok", 3).await;

        // 取走作业后消失的 Worker：租约立即过期
        let taken = h
            .broker
            .dequeue(&["default".to_string()], Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken.id, job.id);

        h.pool.start().await.unwrap();
        wait_for_status(&h, &job, TaskStatus::Completed).await;
        h.pool.shutdown().await.unwrap();

        assert_eq!(h.handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(h.broker.stats("default").await.unwrap().processing, 0);
        // 中断的一次执行加上恢复后的一次执行
        assert_eq!(h.tracker.get(&job.id).await.unwrap().unwrap().attempts, 2);
    }
}
