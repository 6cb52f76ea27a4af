//! 论文 DTO
//!
//! 定义论文导入、书库管理与检索相关的请求和响应数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common_dto::PageInfo;
use crate::models::{
    Author, Paper, PaperSource, PaperSummary, ProcessingStatus, ReadingStatus, UserPaper,
};

/// 通过 URL 添加论文
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddPaperRequest {
    /// 论文地址（arXiv、PubMed、PDF 或普通网页）
    #[validate(url(message = "Invalid URL"))]
    pub url: String,
    /// 标签
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// 笔记
    #[serde(default)]
    pub notes: Option<String>,
}

/// 上传参数
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UploadQuery {
    /// 文件名（用于扩展名校验）
    pub filename: String,
}

/// 上传校验结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    pub filename: String,
    pub size: usize,
    pub message: String,
}

/// 书库列表查询
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LibraryQuery {
    /// 阅读状态过滤
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// 更新书库条目
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UpdateLibraryEntryRequest {
    #[schema(value_type = Option<String>)]
    pub status: Option<ReadingStatus>,
    /// 阅读进度 0-100
    #[validate(range(max = 100))]
    pub reading_progress: Option<u8>,
    /// 评分 1-5
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    /// 阅读时长（秒）
    pub time_spent: Option<u64>,
}

/// 论文检索过滤条件
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct PaperSearchFilters {
    pub publication_year: Option<i32>,
    pub source: Option<String>,
    pub journal: Option<String>,
    /// 作者名（任一匹配即可）
    pub authors: Option<Vec<String>>,
    pub has_pdf: Option<bool>,
    pub citation_count_min: Option<u64>,
    pub citation_count_max: Option<u64>,
}

/// 论文检索请求
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PaperSearchRequest {
    /// 查询词
    #[validate(length(min = 1, max = 500))]
    pub query: String,
    #[serde(default)]
    pub filters: Option<PaperSearchFilters>,
    /// relevance | date | citations | title
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    /// asc | desc
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: usize,
    #[serde(default = "default_per_page")]
    #[validate(range(min = 1, max = 100))]
    pub per_page: usize,
}

fn default_sort_by() -> String {
    "relevance".into()
}

fn default_sort_order() -> String {
    "desc".into()
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

/// 批量添加
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BulkAddRequest {
    /// 1-50 个 URL
    #[validate(length(min = 1, max = 50, message = "Provide between 1 and 50 URLs"))]
    pub urls: Vec<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// 单个 URL 的批量添加结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkItemResult {
    pub url: String,
    pub success: bool,
    pub paper_id: Option<String>,
    pub is_new: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkAddResponse {
    pub results: Vec<BulkItemResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// 论文视图
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaperResponse {
    pub id: String,
    pub title: String,
    #[schema(value_type = Vec<Object>)]
    pub authors: Vec<Author>,
    pub r#abstract: Option<String>,
    pub keywords: Vec<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub pmid: Option<String>,
    pub journal: Option<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub pdf_url: Option<String>,
    #[schema(value_type = String)]
    pub source: PaperSource,
    #[schema(value_type = String)]
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub summary: Option<PaperSummary>,
    pub key_insights: Vec<String>,
    pub methodology: Option<String>,
    pub limitations: Option<String>,
    pub contributions: Vec<String>,
    pub citation_count: u64,
    pub influence_score: f64,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Paper> for PaperResponse {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            r#abstract: paper.r#abstract.clone(),
            keywords: paper.keywords.clone(),
            doi: paper.doi.clone(),
            arxiv_id: paper.arxiv_id.clone(),
            pmid: paper.pmid.clone(),
            journal: paper.journal.clone(),
            publication_year: paper.publication_year,
            publication_date: paper.publication_date,
            url: paper.url.clone(),
            pdf_url: paper.pdf_url.clone(),
            source: paper.source,
            processing_status: paper.processing_status,
            processing_error: paper.processing_error.clone(),
            summary: paper.summary.clone(),
            key_insights: paper.key_insights.clone(),
            methodology: paper.methodology.clone(),
            limitations: paper.limitations.clone(),
            contributions: paper.contributions.clone(),
            citation_count: paper.citation_count,
            influence_score: paper.influence_score,
            processed_at: paper.processed_at,
            created_at: paper.created_at,
        }
    }
}

/// 书库条目视图
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryEntryResponse {
    #[schema(value_type = String)]
    pub status: ReadingStatus,
    pub reading_progress: u8,
    pub time_spent: u64,
    pub rating: Option<u8>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl From<&UserPaper> for LibraryEntryResponse {
    fn from(entry: &UserPaper) -> Self {
        Self {
            status: entry.status,
            reading_progress: entry.reading_progress,
            time_spent: entry.time_spent,
            rating: entry.rating,
            tags: entry.tags.clone(),
            notes: entry.notes.clone(),
            added_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
        }
    }
}

/// 书库中的论文
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryPaperResponse {
    pub paper: PaperResponse,
    pub library: LibraryEntryResponse,
}

impl LibraryPaperResponse {
    pub fn new(paper: &Paper, entry: &UserPaper) -> Self {
        Self {
            paper: PaperResponse::from(paper),
            library: LibraryEntryResponse::from(entry),
        }
    }
}

/// 添加论文响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AddPaperResponse {
    pub paper: PaperResponse,
    pub is_new: bool,
    /// 新论文的处理任务 ID
    pub task_id: Option<String>,
    pub message: String,
}

/// 书库列表响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryListResponse {
    pub papers: Vec<LibraryPaperResponse>,
    pub pagination: PageInfo,
}

/// 论文检索响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaperSearchResponse {
    pub papers: Vec<LibraryPaperResponse>,
    pub pagination: PageInfo,
    pub query: String,
    pub took_ms: u64,
}

/// 摘要视图
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaperSummaryResponse {
    pub paper_id: String,
    pub title: String,
    #[schema(value_type = Object)]
    pub summary: PaperSummary,
    pub key_insights: Vec<String>,
    pub methodology: Option<String>,
    pub limitations: Option<String>,
    pub contributions: Vec<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 用户论文统计
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct PaperStatsResponse {
    pub total_papers: u64,
    pub reading: u64,
    pub completed: u64,
    pub saved: u64,
    pub archived: u64,
    /// 累计阅读时长（秒）
    pub total_reading_time: u64,
}

/// 推荐条目
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Recommendation {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub score: f64,
    pub reason: String,
    /// popular | similar_topic
    pub recommendation_type: String,
}

/// 重新处理响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReprocessResponse {
    pub paper_id: String,
    pub task_id: String,
    pub message: String,
}
