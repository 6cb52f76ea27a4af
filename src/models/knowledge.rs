use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Record;

/// 知识条目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[display("summary")]
    Summary,
    #[display("note")]
    Note,
    #[display("highlight")]
    Highlight,
    #[display("insight")]
    Insight,
    #[display("question")]
    Question,
}

/// 知识库条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub user_id: String,
    pub paper_id: Option<String>,
    pub title: String,
    pub content: String,
    pub entry_type: EntryType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub section_reference: Option<String>,
    pub page_number: Option<u32>,
    /// 长内容的 AI 摘要
    pub summary: Option<String>,
    #[serde(default)]
    pub connections: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(user_id: &str, title: &str, content: &str, entry_type: EntryType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            paper_id: None,
            title: title.to_string(),
            content: content.to_string(),
            entry_type,
            tags: Vec::new(),
            section_reference: None,
            page_number: None,
            summary: None,
            connections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 标题、正文或摘要中是否包含查询词（不区分大小写）
    pub fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self.content.to_lowercase().contains(needle_lower)
            || self
                .summary
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(needle_lower))
    }
}

impl Record for KnowledgeEntry {
    const TABLE: &'static str = "knowledge_entry";

    fn id(&self) -> &str {
        &self.id
    }
}
