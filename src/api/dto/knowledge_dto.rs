//! 知识库 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common_dto::{PageInfo, TagCount};
use crate::models::{EntryType, KnowledgeEntry};

/// 创建知识条目
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateKnowledgeRequest {
    /// 标题（1-500 字符）
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    /// 正文
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: String,
    #[schema(value_type = String)]
    pub entry_type: EntryType,
    pub paper_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub section_reference: Option<String>,
    pub page_number: Option<u32>,
}

/// 更新知识条目
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UpdateKnowledgeRequest {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: Option<String>,
    #[schema(value_type = Option<String>)]
    pub entry_type: Option<EntryType>,
    pub tags: Option<Vec<String>>,
    pub section_reference: Option<String>,
    pub page_number: Option<u32>,
}

/// 知识条目列表查询
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct KnowledgeListQuery {
    #[schema(value_type = Option<String>)]
    pub entry_type: Option<EntryType>,
    pub paper_id: Option<String>,
    /// 单个标签过滤
    pub tag: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// 知识条目检索
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct KnowledgeSearchRequest {
    #[validate(length(min = 1, max = 500))]
    pub query: String,
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub entry_types: Option<Vec<EntryType>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    20
}

/// 知识条目视图
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KnowledgeResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    #[schema(value_type = String)]
    pub entry_type: EntryType,
    pub paper_id: Option<String>,
    pub tags: Vec<String>,
    pub section_reference: Option<String>,
    pub page_number: Option<u32>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&KnowledgeEntry> for KnowledgeResponse {
    fn from(entry: &KnowledgeEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            content: entry.content.clone(),
            entry_type: entry.entry_type,
            paper_id: entry.paper_id.clone(),
            tags: entry.tags.clone(),
            section_reference: entry.section_reference.clone(),
            page_number: entry.page_number,
            summary: entry.summary.clone(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KnowledgeListResponse {
    pub entries: Vec<KnowledgeResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KnowledgeSearchResponse {
    pub entries: Vec<KnowledgeResponse>,
    pub total: usize,
    pub query: String,
    pub took_ms: u64,
}

/// 知识库统计
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KnowledgeStatsResponse {
    pub total_entries: u64,
    /// 按类型计数
    pub by_type: std::collections::BTreeMap<String, u64>,
    /// 近 7 天新增
    pub recent_entries: u64,
    /// 不同标签数
    pub unique_tags: usize,
    pub top_tags: Vec<TagCount>,
}
