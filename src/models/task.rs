use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// 后台任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    #[display("pending")]
    Pending,
    #[display("running")]
    Running,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("retrying")]
    Retrying,
}

/// 后台任务记录
///
/// 以作业 ID 为主键，API 层通过它轮询任务状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub id: String,
    pub task_type: String,
    #[serde(default)]
    pub task_data: serde_json::Value,
    pub status: TaskStatus,
    /// 进度 0-100
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub paper_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingTask {
    pub fn new(task_id: &str, task_type: &str, task_data: serde_json::Value) -> Self {
        let now = Utc::now();
        let paper_id = task_data
            .get("paper_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let user_id = task_data
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            id: task_id.to_string(),
            task_type: task_type.to_string(),
            task_data,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error_message: None,
            paper_id,
            user_id,
            attempts: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl Record for ProcessingTask {
    const TABLE: &'static str = "processing_task";

    fn id(&self) -> &str {
        &self.id
    }
}
