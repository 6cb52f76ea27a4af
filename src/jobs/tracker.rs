//! 任务跟踪与提交
//!
//! `TaskTracker` 把作业的生命周期写入 ProcessingTask 记录，API 层据此轮询任务状态；
//! `TaskDispatcher` 是 API 层提交后台作业的入口。

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::jobs::broker::JobBroker;
use crate::jobs::job::{Job, JobOutcome};
use crate::models::{ProcessingTask, TaskStatus};
use crate::observability::AppMetrics;
use crate::storage::{Collection, DocumentStore, Filter};

/// ProcessingTask 生命周期跟踪
#[derive(Clone)]
pub struct TaskTracker {
    tasks: Collection<ProcessingTask>,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            tasks: Collection::new(store),
        }
    }

    async fn load(&self, job: &Job) -> Result<ProcessingTask> {
        Ok(self
            .tasks
            .get(&job.id)
            .await?
            .unwrap_or_else(|| ProcessingTask::new(&job.id, &job.task, job.payload.clone())))
    }

    /// 作业入队
    pub async fn created(&self, job: &Job) -> Result<()> {
        let task = ProcessingTask::new(&job.id, &job.task, job.payload.clone());
        self.tasks.save(&task).await
    }

    /// 作业开始执行
    pub async fn started(&self, job: &Job) -> Result<()> {
        let mut task = self.load(job).await?;
        task.status = TaskStatus::Running;
        task.attempts = job.attempts;
        task.started_at.get_or_insert_with(Utc::now);
        task.progress = 10;
        task.touch();
        self.tasks.save(&task).await
    }

    /// 作业等待重试
    pub async fn retrying(&self, job: &Job, error: &str) -> Result<()> {
        let mut task = self.load(job).await?;
        task.status = TaskStatus::Retrying;
        task.attempts = job.attempts;
        task.error_message = Some(error.to_string());
        task.touch();
        self.tasks.save(&task).await
    }

    /// 作业成功
    pub async fn completed(&self, job: &Job, result: serde_json::Value) -> Result<()> {
        let mut task = self.load(job).await?;
        let now = Utc::now();
        task.status = TaskStatus::Completed;
        task.attempts = job.attempts;
        task.progress = 100;
        task.result = Some(result);
        task.error_message = None;
        task.completed_at = Some(now);
        task.updated_at = now;
        self.tasks.save(&task).await
    }

    /// 作业最终失败
    pub async fn failed(&self, job: &Job, error: &str) -> Result<()> {
        let mut task = self.load(job).await?;
        let now = Utc::now();
        task.status = TaskStatus::Failed;
        task.attempts = job.attempts;
        task.error_message = Some(error.to_string());
        task.completed_at = Some(now);
        task.updated_at = now;
        self.tasks.save(&task).await
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<ProcessingTask>> {
        self.tasks.get(task_id).await
    }

    /// 删除早于 cutoff 的失败任务记录，返回删除数量
    pub async fn cleanup_failed(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let failed = self
            .tasks
            .find(&Filter::new().eq("status", TaskStatus::Failed.to_string()))
            .await?;
        let mut deleted = 0;
        for task in failed
            .iter()
            .filter(|t| t.completed_at.unwrap_or(t.updated_at) < cutoff)
        {
            if self.tasks.delete(&task.id).await? {
                deleted += 1;
            }
        }
        info!(deleted = deleted, "Cleaned up failed tasks");
        Ok(deleted)
    }
}

/// API 层的作业提交入口
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn JobBroker>,
    tracker: TaskTracker,
    metrics: Arc<AppMetrics>,
    max_retries: u32,
}

impl TaskDispatcher {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        tracker: TaskTracker,
        metrics: Arc<AppMetrics>,
        max_retries: u32,
    ) -> Self {
        Self {
            broker,
            tracker,
            metrics,
            max_retries,
        }
    }

    /// 提交作业，返回作业（其 ID 即任务 ID）
    pub async fn submit(&self, task: &str, payload: serde_json::Value) -> Result<Job> {
        let job = Job::new(task, payload).with_max_retries(self.max_retries);
        self.submit_job(&job).await?;
        Ok(job)
    }

    /// 提交已构造好的作业
    pub async fn submit_job(&self, job: &Job) -> Result<()> {
        self.tracker.created(job).await?;
        self.broker.enqueue(job).await?;
        self.metrics.record_job(&job.task, "enqueued");
        info!(job_id = %job.id, task = %job.task, queue = %job.queue, "Job enqueued");
        Ok(())
    }

    /// 查询任务状态
    ///
    /// 任务记录缺失时回退到结果后端（例如记录已被清理但结果尚未过期）。
    pub async fn status(&self, task_id: &str) -> Result<Option<ProcessingTask>> {
        if let Some(task) = self.tracker.get(task_id).await? {
            return Ok(Some(task));
        }
        debug!(task_id = task_id, "Task record missing, checking result backend");

        Ok(self.broker.result(task_id).await?.map(|result| {
            let mut task = ProcessingTask::new(&result.job_id, &result.task, serde_json::Value::Null);
            task.status = match result.outcome {
                JobOutcome::Completed => TaskStatus::Completed,
                JobOutcome::Retrying => TaskStatus::Retrying,
                _ => TaskStatus::Failed,
            };
            task.progress = if result.is_success() { 100 } else { task.progress };
            task.result = result.output;
            task.error_message = result.error;
            task.completed_at = Some(result.finished_at);
            task
        }))
    }

    pub fn broker(&self) -> &Arc<dyn JobBroker> {
        &self.broker
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobResult;
    use crate::jobs::memory_broker::MemoryBroker;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn dispatcher() -> TaskDispatcher {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        TaskDispatcher::new(
            Arc::new(MemoryBroker::new(60)),
            TaskTracker::new(store),
            Arc::new(AppMetrics::new().unwrap()),
            3,
        )
    }

    #[tokio::test]
    async fn test_submit_tracks_lifecycle() {
        let dispatcher = dispatcher();
        let job = dispatcher
            .submit("process_paper", json!({"paper_id": "p1"}))
            .await
            .unwrap();
        assert_eq!(job.max_attempts, 4);

        let task = dispatcher.status(&job.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.paper_id.as_deref(), Some("p1"));

        let tracker = dispatcher.tracker();
        tracker.started(&job).await.unwrap();
        assert!(tracker.get(&job.id).await.unwrap().unwrap().started_at.is_some());

        tracker.completed(&job, json!({"status": "done"})).await.unwrap();
        let task = dispatcher.status(&job.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_status_falls_back_to_result_backend() {
        let dispatcher = dispatcher();
        let job = Job::new("update_citations", json!({}));
        let result = JobResult::failure(&job, JobOutcome::Failed, "boom", 10);
        dispatcher.broker().complete(&job, &result).await.unwrap();

        let task = dispatcher.status(&job.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("boom"));

        assert!(dispatcher.status("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_failed_respects_cutoff() {
        let dispatcher = dispatcher();
        let tracker = dispatcher.tracker();
        let failed = dispatcher.submit("update_citations", json!({})).await.unwrap();
        tracker.failed(&failed, "boom").await.unwrap();
        let done = dispatcher.submit("update_citations", json!({})).await.unwrap();
        tracker.completed(&done, json!({})).await.unwrap();

        let past = Utc::now() - chrono::Duration::days(7);
        assert_eq!(tracker.cleanup_failed(past).await.unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(tracker.cleanup_failed(future).await.unwrap(), 1);
        assert!(tracker.get(&failed.id).await.unwrap().is_none());
        assert!(tracker.get(&done.id).await.unwrap().is_some());
    }
}
