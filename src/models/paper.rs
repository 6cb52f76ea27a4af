use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Record;

/// 论文来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
pub enum PaperSource {
    #[display("arxiv")]
    Arxiv,
    #[display("journal")]
    Journal,
    #[display("pdf_upload")]
    PdfUpload,
    #[display("url")]
    Url,
}

/// 论文处理状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    #[display("pending")]
    Pending,
    #[display("processing")]
    Processing,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

/// 作者
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// AI 生成的结构化摘要
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PaperSummary {
    /// 研究问题
    pub research_question: String,
    /// 方法概述
    pub methodology: String,
    /// 主要发现
    pub key_findings: Vec<String>,
    /// 局限性
    pub limitations: Vec<String>,
    /// 研究意义
    pub significance: String,
    /// 未来工作
    pub future_work: Vec<String>,
    /// 置信度 (0-1)
    pub confidence_score: f64,
}

/// 关键洞见
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyInsight {
    pub insight: String,
    #[serde(default = "default_score")]
    pub relevance_score: f64,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
}

/// 论文贡献
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperContribution {
    pub contribution: String,
    /// theoretical / empirical / methodological / practical
    #[serde(rename = "type", default = "default_contribution_kind")]
    pub kind: String,
    #[serde(default = "default_score")]
    pub significance: f64,
}

fn default_score() -> f64 {
    0.5
}

fn default_contribution_kind() -> String {
    "empirical".into()
}

/// 论文实体
///
/// 论文记录在所有用户间共享，用户与论文的关系保存在 [`UserPaper`](super::library::UserPaper) 中。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub pmid: Option<String>,

    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,

    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub publication_year: Option<i32>,

    pub url: Option<String>,
    pub pdf_url: Option<String>,
    pub source: PaperSource,

    pub full_text: Option<String>,
    pub summary: Option<PaperSummary>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    pub methodology: Option<String>,
    pub limitations: Option<String>,
    #[serde(default)]
    pub contributions: Vec<String>,

    pub processing_status: ProcessingStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,

    #[serde(default)]
    pub citation_count: u64,
    #[serde(default)]
    pub influence_score: f64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// 创建待处理的论文
    pub fn new(title: impl Into<String>, source: PaperSource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            doi: None,
            arxiv_id: None,
            pmid: None,
            title: title.into(),
            authors: Vec::new(),
            r#abstract: None,
            keywords: Vec::new(),
            journal: None,
            volume: None,
            issue: None,
            pages: None,
            publication_date: None,
            publication_year: None,
            url: None,
            pdf_url: None,
            source,
            full_text: None,
            summary: None,
            key_insights: Vec::new(),
            methodology: None,
            limitations: None,
            contributions: Vec::new(),
            processing_status: ProcessingStatus::Pending,
            processed_at: None,
            processing_error: None,
            citation_count: 0,
            influence_score: 0.0,
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn author_names(&self) -> Vec<String> {
        self.authors.iter().map(|a| a.name.clone()).collect()
    }

    pub fn mark_processing(&mut self) {
        self.processing_status = ProcessingStatus::Processing;
        self.processing_error = None;
        self.touch();
    }

    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.processing_status = ProcessingStatus::Completed;
        self.processed_at = Some(now);
        self.processing_error = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.processing_status = ProcessingStatus::Failed;
        self.processing_error = Some(error.into());
        self.touch();
    }

    /// 送入 AI 分析的文本
    ///
    /// 有全文时为 "Title / Abstract / Full Text" 三段，否则退化为摘要；
    /// 两者都没有时返回 None。
    pub fn analysis_content(&self) -> Option<String> {
        let abstract_text = self.r#abstract.as_deref().unwrap_or("").trim();
        match self.full_text.as_deref().map(str::trim) {
            Some(full_text) if !full_text.is_empty() => Some(format!(
                "Title: {}\n\nAbstract: {}\n\nFull Text: {}",
                self.title, abstract_text, full_text
            )),
            _ if !abstract_text.is_empty() => Some(format!(
                "Title: {}\n\nContent: {}",
                self.title, abstract_text
            )),
            _ => None,
        }
    }
}

impl Record for Paper {
    const TABLE: &'static str = "paper";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_content_prefers_full_text() {
        let mut paper = Paper::new("Attention", PaperSource::Arxiv);
        assert!(paper.analysis_content().is_none());

        paper.r#abstract = Some("We propose the transformer.".into());
        assert_eq!(
            paper.analysis_content().unwrap(),
            "Title: Attention\n\nContent: We propose the transformer."
        );

        paper.full_text = Some("Section 1".into());
        let content = paper.analysis_content().unwrap();
        assert!(content.starts_with("Title: Attention\n\nAbstract: We propose"));
        assert!(content.ends_with("Full Text: Section 1"));
    }

    #[test]
    fn test_status_transitions() {
        let mut paper = Paper::new("X", PaperSource::Url);
        paper.mark_processing();
        assert_eq!(paper.processing_status, ProcessingStatus::Processing);

        paper.mark_failed("boom");
        assert_eq!(paper.processing_error.as_deref(), Some("boom"));

        paper.mark_completed();
        assert_eq!(paper.processing_status, ProcessingStatus::Completed);
        assert!(paper.processed_at.is_some());
        assert!(paper.processing_error.is_none());
    }

    #[test]
    fn test_contribution_uses_type_field() {
        let json = serde_json::json!({"contribution": "New dataset", "type": "empirical"});
        let contribution: PaperContribution = serde_json::from_value(json).unwrap();
        assert_eq!(contribution.kind, "empirical");
        assert_eq!(contribution.significance, 0.5);
    }
}
