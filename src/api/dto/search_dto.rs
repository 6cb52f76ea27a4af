//! 搜索 DTO
//!
//! 定义全局搜索与搜索建议的请求和响应数据结构。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::knowledge_dto::KnowledgeResponse;
use super::paper_dto::PaperResponse;

/// 全局搜索参数
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GlobalSearchQuery {
    /// 搜索查询
    pub q: String,
    /// 是否包含论文
    #[serde(default = "default_true")]
    pub include_papers: bool,
    /// 是否包含知识条目
    #[serde(default = "default_true")]
    pub include_knowledge: bool,
    /// 每类返回数量
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    10
}

/// 全局搜索响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GlobalSearchResponse {
    /// 查询
    pub query: String,
    pub papers: Vec<PaperResponse>,
    pub knowledge: Vec<KnowledgeResponse>,
    /// 结果数量
    pub total_results: usize,
    /// 耗时（毫秒）
    pub took_ms: u64,
}

/// 搜索建议参数
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SuggestionsQuery {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// 搜索建议响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SuggestionsResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}
