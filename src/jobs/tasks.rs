//! 后台任务实现
//!
//! Worker 通过 `TaskHandler` 执行任务；`ResearchTasks` 把任务名称映射到论文与引用服务。

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::jobs::job::Job;
use crate::jobs::tracker::TaskDispatcher;
use crate::services::{CitationService, PaperService};

pub const PROCESS_PAPER: &str = "process_paper";
pub const BATCH_PROCESS_PAPERS: &str = "batch_process_papers";
pub const PROCESS_PENDING_PAPERS: &str = "process_pending_papers";
pub const CLEANUP_FAILED_TASKS: &str = "cleanup_failed_tasks";
pub const UPDATE_PAPER_METRICS: &str = "update_paper_metrics";
pub const UPDATE_CITATIONS: &str = "update_citations";
pub const GENERATE_EMBEDDINGS: &str = "generate_embeddings";
pub const GENERATE_USER_RECOMMENDATIONS: &str = "generate_user_recommendations";

pub const TASK_NAMES: &[&str] = &[
    PROCESS_PAPER,
    BATCH_PROCESS_PAPERS,
    PROCESS_PENDING_PAPERS,
    CLEANUP_FAILED_TASKS,
    UPDATE_PAPER_METRICS,
    UPDATE_CITATIONS,
    GENERATE_EMBEDDINGS,
    GENERATE_USER_RECOMMENDATIONS,
];

/// 每次扫描的 pending 论文数
const PENDING_BATCH: usize = 10;

/// 失败任务保留天数
const FAILED_TASK_RETENTION_DAYS: i64 = 7;

/// 每次更新指标的论文数
const METRICS_BATCH: usize = 100;

/// 任务执行器
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 是否认识该任务名称
    fn handles(&self, task: &str) -> bool;

    /// 执行任务，返回写入结果后端的输出
    async fn handle(&self, job: &Job) -> Result<Value>;

    /// 重试耗尽或不可重试失败后的收尾
    async fn on_failed(&self, _job: &Job, _error: &str) {}
}

fn required<'a>(job: &'a Job, key: &str) -> Result<&'a str> {
    job.payload_str(key)
        .ok_or_else(|| AppError::Validation(format!("Task {} requires '{}'", job.task, key)))
}

/// 论文与引用相关的后台任务
#[derive(Clone)]
pub struct ResearchTasks {
    papers: PaperService,
    citations: CitationService,
    dispatcher: TaskDispatcher,
}

impl ResearchTasks {
    pub fn new(papers: PaperService, citations: CitationService, dispatcher: TaskDispatcher) -> Self {
        Self {
            papers,
            citations,
            dispatcher,
        }
    }

    async fn process_paper(&self, job: &Job) -> Result<Value> {
        let paper_id = required(job, "paper_id")?;
        tracing::info!(paper_id = paper_id, attempt = job.attempts, "Starting paper processing");
        let paper = self.papers.process_paper_content(paper_id).await?;
        Ok(json!({
            "status": "completed",
            "paper_id": paper.id,
            "insights": paper.key_insights.len(),
        }))
    }

    async fn batch_process_papers(&self, job: &Job) -> Result<Value> {
        let paper_ids: Vec<String> = job
            .payload
            .get("paper_ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::Validation("Task batch_process_papers requires 'paper_ids'".into()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let mut results = Vec::with_capacity(paper_ids.len());
        for paper_id in &paper_ids {
            match self
                .dispatcher
                .submit(PROCESS_PAPER, json!({ "paper_id": paper_id }))
                .await
            {
                Ok(queued) => results.push(json!({
                    "paper_id": paper_id,
                    "task_id": queued.id,
                    "status": "queued",
                })),
                Err(e) => {
                    tracing::warn!(paper_id = %paper_id, error = %e, "Failed to queue paper");
                    results.push(json!({
                        "paper_id": paper_id,
                        "status": "failed",
                        "error": e.to_string(),
                    }));
                }
            }
        }
        tracing::info!(total = paper_ids.len(), "Batch processing queued");
        Ok(json!({ "results": results, "total_papers": paper_ids.len() }))
    }

    async fn process_pending_papers(&self) -> Result<Value> {
        let pending = self.papers.pending_papers(PENDING_BATCH).await?;
        let mut queued = 0;
        for paper in &pending {
            match self
                .dispatcher
                .submit(PROCESS_PAPER, json!({ "paper_id": paper.id }))
                .await
            {
                Ok(_) => queued += 1,
                Err(e) => tracing::warn!(paper_id = %paper.id, error = %e, "Failed to queue pending paper"),
            }
        }
        tracing::info!(queued = queued, "Queued pending papers");
        Ok(json!({ "queued_papers": queued }))
    }

    async fn cleanup_failed_tasks(&self) -> Result<Value> {
        let cutoff = Utc::now() - Duration::days(FAILED_TASK_RETENTION_DAYS);
        let deleted = self.dispatcher.tracker().cleanup_failed(cutoff).await?;
        Ok(json!({ "deleted_tasks": deleted }))
    }

    async fn update_citations(&self, job: &Job) -> Result<Value> {
        let paper_id = required(job, "paper_id")?;
        let (citation_count, influence_score) = self.citations.refresh_metrics(paper_id).await?;
        Ok(json!({
            "status": "completed",
            "paper_id": paper_id,
            "citation_count": citation_count,
            "influence_score": influence_score,
        }))
    }

    async fn generate_embeddings(&self, job: &Job) -> Result<Value> {
        let paper_id = required(job, "paper_id")?;
        let dimension = self.papers.generate_embedding(paper_id).await?;
        tracing::info!(paper_id = paper_id, dimension = dimension, "Stored paper embedding");
        Ok(json!({
            "status": "completed",
            "paper_id": paper_id,
            "embedding_size": dimension,
        }))
    }

    async fn generate_user_recommendations(&self, job: &Job) -> Result<Value> {
        let user_id = required(job, "user_id")?;
        let recommendations = self.papers.refresh_recommendations(user_id).await?;
        tracing::info!(user_id = user_id, count = recommendations.len(), "Generated recommendations");
        Ok(json!({
            "status": "completed",
            "user_id": user_id,
            "recommendation_count": recommendations.len(),
        }))
    }
}

#[async_trait]
impl TaskHandler for ResearchTasks {
    fn handles(&self, task: &str) -> bool {
        TASK_NAMES.contains(&task)
    }

    async fn handle(&self, job: &Job) -> Result<Value> {
        match job.task.as_str() {
            PROCESS_PAPER => self.process_paper(job).await,
            BATCH_PROCESS_PAPERS => self.batch_process_papers(job).await,
            PROCESS_PENDING_PAPERS => self.process_pending_papers().await,
            CLEANUP_FAILED_TASKS => self.cleanup_failed_tasks().await,
            UPDATE_PAPER_METRICS => {
                let updated = self.citations.update_paper_metrics(METRICS_BATCH).await?;
                Ok(json!({ "updated_papers": updated }))
            }
            UPDATE_CITATIONS => self.update_citations(job).await,
            GENERATE_EMBEDDINGS => self.generate_embeddings(job).await,
            GENERATE_USER_RECOMMENDATIONS => self.generate_user_recommendations(job).await,
            other => Err(AppError::Validation(format!("Unknown task: {}", other))),
        }
    }

    /// 论文处理最终失败时，把论文标记为 failed
    async fn on_failed(&self, job: &Job, error: &str) {
        if job.task != PROCESS_PAPER {
            return;
        }
        if let Some(paper_id) = job.payload_str("paper_id") {
            if let Err(e) = self.papers.mark_failed(paper_id, error).await {
                tracing::error!(paper_id = paper_id, error = %e, "Failed to mark paper as failed");
            }
        }
    }
}
