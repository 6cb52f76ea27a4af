//! 作业定义
//!
//! - `Job`: 队列中的一次任务调用
//! - `JobOutcome`: 执行结果分类
//! - `JobResult`: 写入结果后端的执行结果

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 默认最大尝试次数（首次执行 + 重试）
const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// 默认优先级
const DEFAULT_PRIORITY: i32 = 0;

/// 任务名称与队列的路由
pub fn route_task(task: &str) -> &'static str {
    match task {
        "process_paper" => "paper_processing",
        "generate_embeddings" => "ai_processing",
        "update_citations" => "citations",
        _ => "default",
    }
}

/// 一次任务调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 作业 ID，同时也是 ProcessingTask 的主键
    pub id: String,
    /// 任务名称
    pub task: String,
    /// 所在队列
    pub queue: String,
    /// 任务参数
    #[serde(default)]
    pub payload: serde_json::Value,
    /// 优先级（越大越优先）
    pub priority: i32,
    /// 已尝试次数
    pub attempts: u32,
    /// 最大尝试次数
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// 最早执行时间
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
}

impl Job {
    /// 创建作业，队列由任务名称路由得出
    pub fn new(task: impl Into<String>, payload: serde_json::Value) -> Self {
        let task = task.into();
        Self {
            id: Uuid::new_v4().to_string(),
            queue: route_task(&task).to_string(),
            task,
            payload,
            priority: DEFAULT_PRIORITY,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            eta: None,
        }
    }

    /// 按最大重试次数设置尝试上限
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_attempts = max_retries + 1;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// 第 n 次重试前的等待时间：base × 2^(attempts-1)
    pub fn retry_delay(&self, base_secs: u64) -> std::time::Duration {
        let exponent = self.attempts.saturating_sub(1).min(16);
        std::time::Duration::from_secs(base_secs.saturating_mul(1u64 << exponent))
    }

    /// 读取字符串参数
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// 执行结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("retrying")]
    Retrying,
    #[display("timeout")]
    Timeout,
    #[display("cancelled")]
    Cancelled,
}

/// 作业执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub task: String,
    pub outcome: JobOutcome,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn success(job: &Job, output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            job_id: job.id.clone(),
            task: job.task.clone(),
            outcome: JobOutcome::Completed,
            output: Some(output),
            error: None,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        job: &Job,
        outcome: JobOutcome,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            task: job.task.clone(),
            outcome,
            output: None,
            error: Some(error.into()),
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case("process_paper", "paper_processing")]
    #[case("generate_embeddings", "ai_processing")]
    #[case("update_citations", "citations")]
    #[case("cleanup_failed_tasks", "default")]
    #[case("generate_user_recommendations", "default")]
    fn test_task_routing(#[case] task: &str, #[case] queue: &str) {
        assert_eq!(route_task(task), queue);
        assert_eq!(Job::new(task, serde_json::json!({})).queue, queue);
    }

    #[test]
    fn test_attempt_accounting() {
        let mut job = Job::new("process_paper", serde_json::json!({})).with_max_retries(2);
        assert_eq!(job.max_attempts, 3);
        assert!(job.should_retry());

        job.increment_attempts();
        job.increment_attempts();
        assert_eq!(job.remaining_attempts(), 1);
        job.increment_attempts();
        assert!(!job.should_retry());
    }

    #[test]
    fn test_retry_delay_is_exponential() {
        let mut job = Job::new("process_paper", serde_json::json!({}));
        job.increment_attempts();
        assert_eq!(job.retry_delay(60), Duration::from_secs(60));
        job.increment_attempts();
        assert_eq!(job.retry_delay(60), Duration::from_secs(120));
        job.increment_attempts();
        assert_eq!(job.retry_delay(60), Duration::from_secs(240));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(JobOutcome::Retrying.to_string(), "retrying");
        assert_eq!(JobOutcome::Timeout.to_string(), "timeout");
    }
}
