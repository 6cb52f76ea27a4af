//! 任务与运维 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::jobs::QueueStats;
use crate::models::{ProcessingTask, TaskStatus};

/// 任务状态
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub task_type: String,
    #[schema(value_type = String)]
    pub status: TaskStatus,
    pub progress: u8,
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ProcessingTask> for TaskStatusResponse {
    fn from(task: ProcessingTask) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type,
            status: task.status,
            progress: task.progress,
            result: task.result,
            error: task.error_message,
            attempts: task.attempts,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

/// 维护模式开关
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MaintenanceRequest {
    pub enabled: bool,
    /// 自动关闭前的秒数，默认 1 小时
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MaintenanceResponse {
    pub maintenance_mode: bool,
    pub message: String,
}

/// 系统状态
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SystemStatusResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub broker_backend: String,
    pub store_backend: String,
    pub ai_provider: String,
    #[schema(value_type = Vec<Object>)]
    pub queues: Vec<QueueStats>,
    pub maintenance_mode: bool,
    pub uptime_seconds: f64,
}
