use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// 阅读状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    #[display("saved")]
    Saved,
    #[display("reading")]
    Reading,
    #[display("completed")]
    Completed,
    #[display("archived")]
    Archived,
}

impl std::str::FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saved" => Ok(ReadingStatus::Saved),
            "reading" => Ok(ReadingStatus::Reading),
            "completed" => Ok(ReadingStatus::Completed),
            "archived" => Ok(ReadingStatus::Archived),
            other => Err(format!("Invalid status filter: {}", other)),
        }
    }
}

/// 用户书库条目（用户与论文的多对多关系）
///
/// 主键由用户与论文 ID 拼接而成，保证同一用户不会重复收藏同一篇论文。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPaper {
    pub id: String,
    pub user_id: String,
    pub paper_id: String,
    pub status: ReadingStatus,
    /// 阅读进度 0-100
    pub reading_progress: u8,
    /// 阅读时长（秒）
    pub time_spent: u64,
    /// 评分 1-5
    pub rating: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl UserPaper {
    pub fn new(user_id: &str, paper_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::key(user_id, paper_id),
            user_id: user_id.to_string(),
            paper_id: paper_id.to_string(),
            status: ReadingStatus::Saved,
            reading_progress: 0,
            time_spent: 0,
            rating: None,
            tags: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
        }
    }

    /// 书库条目主键
    pub fn key(user_id: &str, paper_id: &str) -> String {
        format!("{}_{}", user_id, paper_id)
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.last_accessed_at = now;
    }
}

impl Record for UserPaper {
    const TABLE: &'static str = "user_paper";

    fn id(&self) -> &str {
        &self.id
    }
}
