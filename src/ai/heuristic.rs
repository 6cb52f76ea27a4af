//! 离线启发式提供方
//!
//! 不调用任何外部服务：按关键词对句子打分做抽取式分析，向量为哈希词袋。
//! 输出格式与远程模型一致（JSON 或纯文本），分析器无需区分来源。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{AiProvider, CompletionRequest, Operation};
use crate::error::Result;

/// 哈希词袋向量维度
pub const EMBEDDING_DIMENSION: usize = 256;

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(Title|Authors|Abstract|Full Text|Content):\s*").expect("valid regex")
});
static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+|\n+").expect("valid regex"));

const QUESTION_CUES: &[&str] = &["we investigate", "we study", "this paper", "we address", "?"];
const METHOD_CUES: &[&str] = &[
    "method", "approach", "we propose", "using", "experiment", "dataset", "trained", "model",
    "framework", "algorithm",
];
const FINDING_CUES: &[&str] = &[
    "result", "show", "find", "found", "demonstrate", "outperform", "improve", "achieve",
    "reveal",
];
const LIMITATION_CUES: &[&str] = &[
    "limitation", "however", "although", "only", "fail", "cannot", "restricted", "future",
];
const SIGNIFICANCE_CUES: &[&str] = &["important", "significant", "novel", "first", "contribution"];
const FUTURE_CUES: &[&str] = &["future", "further", "extend", "open question"];
const CONTRIBUTION_CUES: &[&str] = &[
    "we propose", "we introduce", "we present", "contribution", "novel", "we develop",
];

#[derive(Debug, Default)]
pub struct HeuristicProvider;

/// 拆分句子（去掉 "Title:" 等标签）
fn sentences(content: &str) -> Vec<String> {
    let cleaned = LABEL_RE.replace_all(content, "");
    SENTENCE_RE
        .split(&cleaned)
        .map(|s| s.trim())
        .filter(|s| s.split_whitespace().count() >= 4)
        .map(|s| s.to_string())
        .collect()
}

fn cue_hits(sentence: &str, cues: &[&str]) -> usize {
    let lower = sentence.to_lowercase();
    cues.iter().filter(|c| lower.contains(*c)).count()
}

/// 按命中数降序取前 `limit` 句，命中相同保持原文顺序
fn top_sentences(sentences: &[String], cues: &[&str], limit: usize) -> Vec<String> {
    let mut scored: Vec<(usize, usize, &String)> = sentences
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let hits = cue_hits(s, cues);
            (hits > 0).then_some((hits, i, s))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, _, s)| s.clone())
        .collect()
}

fn first_or(sentences: &[String], fallback: &str) -> String {
    sentences
        .first()
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn contribution_type(sentence: &str) -> &'static str {
    let lower = sentence.to_lowercase();
    if ["theory", "theoretical", "proof", "bound"].iter().any(|c| lower.contains(c)) {
        "theoretical"
    } else if ["method", "algorithm", "technique", "architecture"]
        .iter()
        .any(|c| lower.contains(c))
    {
        "methodological"
    } else if ["application", "system", "tool", "deploy"].iter().any(|c| lower.contains(c)) {
        "practical"
    } else {
        "empirical"
    }
}

fn summarize(sentences: &[String]) -> serde_json::Value {
    let findings = {
        let found = top_sentences(sentences, FINDING_CUES, 5);
        if found.is_empty() {
            sentences.iter().take(3).cloned().collect()
        } else {
            found
        }
    };
    let question = first_or(
        &top_sentences(sentences, QUESTION_CUES, 1),
        sentences.first().map(String::as_str).unwrap_or("Not stated"),
    );
    let confidence = (0.3 + sentences.len() as f64 * 0.02).min(0.6);

    serde_json::json!({
        "research_question": question,
        "methodology": first_or(&top_sentences(sentences, METHOD_CUES, 1), "Not stated"),
        "key_findings": findings,
        "limitations": top_sentences(sentences, LIMITATION_CUES, 4),
        "significance": first_or(&top_sentences(sentences, SIGNIFICANCE_CUES, 1), "Not stated"),
        "future_work": top_sentences(sentences, FUTURE_CUES, 3),
        "confidence_score": confidence,
    })
}

fn insights(sentences: &[String]) -> serde_json::Value {
    let cues: Vec<&str> = FINDING_CUES
        .iter()
        .chain(SIGNIFICANCE_CUES)
        .chain(CONTRIBUTION_CUES)
        .copied()
        .collect();
    let items: Vec<serde_json::Value> = top_sentences(sentences, &cues, 7)
        .into_iter()
        .map(|s| {
            let score = (0.5 + cue_hits(&s, &cues) as f64 * 0.1).min(0.95);
            serde_json::json!({"insight": s, "relevance_score": score})
        })
        .collect();
    serde_json::Value::Array(items)
}

fn contributions(sentences: &[String]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = top_sentences(sentences, CONTRIBUTION_CUES, 5)
        .into_iter()
        .map(|s| {
            let significance = (0.5 + cue_hits(&s, SIGNIFICANCE_CUES) as f64 * 0.1).min(0.9);
            serde_json::json!({
                "contribution": s,
                "type": contribution_type(&s),
                "significance": significance,
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

/// 哈希词袋向量（L2 归一化）
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        let slot = (hasher.finish() % EMBEDDING_DIMENSION as u64) as usize;
        vector[slot] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl AiProvider for HeuristicProvider {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let sentences = sentences(&request.content);

        let output = match request.operation {
            Operation::Summarize => summarize(&sentences).to_string(),
            Operation::Insights => insights(&sentences).to_string(),
            Operation::Contributions => contributions(&sentences).to_string(),
            Operation::Methodology => {
                let found = top_sentences(&sentences, METHOD_CUES, 3);
                if found.is_empty() {
                    "Methodology details were not identified in the available text.".to_string()
                } else {
                    found.join(" ")
                }
            }
            Operation::Limitations => {
                let found = top_sentences(&sentences, LIMITATION_CUES, 3);
                if found.is_empty() {
                    "No explicit limitations were identified in the available text.".to_string()
                } else {
                    found.join(" ")
                }
            }
            Operation::SummarizeText => {
                let summary = sentences.iter().take(3).cloned().collect::<Vec<_>>().join(". ");
                super::truncate_chars(&summary, 500).to_string()
            }
        };
        Ok(output)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hashed_embedding(text))
    }
}
