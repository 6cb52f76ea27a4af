use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// 引用关系：citing 论文引用了 cited 论文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub citing_paper_id: String,
    pub cited_paper_id: String,
    /// 引用处的上下文
    pub context: Option<String>,
    /// 所在章节
    pub section: Option<String>,
    /// positive / negative / neutral
    pub sentiment: Option<String>,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

impl Citation {
    pub fn new(citing_paper_id: &str, cited_paper_id: &str) -> Self {
        Self {
            id: Self::key(citing_paper_id, cited_paper_id),
            citing_paper_id: citing_paper_id.to_string(),
            cited_paper_id: cited_paper_id.to_string(),
            context: None,
            section: None,
            sentiment: None,
            strength: 1.0,
            created_at: Utc::now(),
        }
    }

    pub fn key(citing_paper_id: &str, cited_paper_id: &str) -> String {
        format!("{}_{}", citing_paper_id, cited_paper_id)
    }
}

impl Record for Citation {
    const TABLE: &'static str = "citation";

    fn id(&self) -> &str {
        &self.id
    }
}
