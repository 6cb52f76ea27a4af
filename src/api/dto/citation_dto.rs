//! 引用 DTO
//!
//! 定义引用网络、影响力指标与研究空白相关的数据结构。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 引用网络查询参数
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(default)]
pub struct NetworkQuery {
    /// 遍历深度
    pub depth: usize,
    /// 节点数上限
    pub max_papers: usize,
}

impl Default for NetworkQuery {
    fn default() -> Self {
        Self {
            depth: 2,
            max_papers: 50,
        }
    }
}

/// 添加引用关系
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCitationRequest {
    /// 施引论文
    #[validate(length(min = 1))]
    pub citing_paper_id: String,
    /// 被引论文
    #[validate(length(min = 1))]
    pub cited_paper_id: String,
    pub context: Option<String>,
    pub section: Option<String>,
    /// positive / negative / neutral
    pub sentiment: Option<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub strength: Option<f64>,
}

/// 网络节点
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NetworkNode {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub citation_count: u64,
    pub influence_score: f64,
    pub is_center: bool,
    /// 距中心论文的层数
    pub depth: usize,
}

/// 网络边：source 引用了 target
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    /// 引用上下文（截断到 100 个字符）
    pub context: Option<String>,
    pub sentiment: Option<String>,
    pub strength: f64,
}

/// 引用网络
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CitationNetwork {
    pub center_paper_id: String,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub depth: usize,
}

/// 引用列表中的一项
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CitationLink {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub citation_count: u64,
    pub context: Option<String>,
    pub section: Option<String>,
    pub sentiment: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CitationListResponse {
    pub paper_id: String,
    pub papers: Vec<CitationLink>,
    pub total: usize,
}

/// 影响力指标
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InfluenceMetrics {
    pub paper_id: String,
    pub direct_citations: usize,
    pub second_order_citations: usize,
    pub h_index: usize,
    pub influence_score: f64,
    pub citation_rate_per_year: f64,
}

/// 研究空白：被频繁引用但不在用户书库中的论文
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResearchGap {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// 被书库论文引用的次数
    pub citation_count: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResearchGapsResponse {
    pub gaps: Vec<ResearchGap>,
    pub total: usize,
}
