//! AI 服务模块
//!
//! 论文分析依赖的大模型调用。远程提供方（OpenAI、Anthropic）直接走 HTTP API，
//! 离线的启发式提供方用于开发与测试。

pub mod analyzer;
pub mod anthropic;
pub mod heuristic;
pub mod openai;

use async_trait::async_trait;
use derive_more::Display;
use std::sync::Arc;

use crate::config::config::AiConfig;
use crate::error::{AppError, Result};

pub use analyzer::{AiAnalyzer, BatchItem, BatchOutcome, PaperAnalysis};
pub use anthropic::AnthropicProvider;
pub use heuristic::HeuristicProvider;
pub use openai::OpenAiProvider;

/// 分析操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operation {
    #[display("summarize")]
    Summarize,
    #[display("insights")]
    Insights,
    #[display("methodology")]
    Methodology,
    #[display("limitations")]
    Limitations,
    #[display("contributions")]
    Contributions,
    #[display("summarize_text")]
    SummarizeText,
}

/// 补全请求
///
/// `prompt` 供远程模型使用；启发式提供方直接读取 `title` 与 `content`。
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub operation: Operation,
    pub title: String,
    pub content: String,
    pub prompt: String,
    /// 为空时使用提供方的默认模型
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 大模型提供方
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 生成文本
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// 生成文本向量
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// 按配置构建的一组提供方
#[derive(Clone)]
pub struct AiProviders {
    /// 默认补全提供方
    pub primary: Arc<dyn AiProvider>,
    /// 配置了密钥时可用，claude 开头的模型路由到这里
    pub anthropic: Option<Arc<dyn AiProvider>>,
    /// 向量化提供方
    pub embedder: Arc<dyn AiProvider>,
}

/// 根据配置创建提供方
pub fn create_providers(config: &AiConfig) -> Result<AiProviders> {
    let openai = match config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Some(Arc::new(OpenAiProvider::new(config, key)?) as Arc<dyn AiProvider>),
        None => None,
    };
    let anthropic = match config.anthropic_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Some(Arc::new(AnthropicProvider::new(config, key)?) as Arc<dyn AiProvider>),
        None => None,
    };
    let heuristic: Arc<dyn AiProvider> = Arc::new(HeuristicProvider::default());

    let primary = match config.provider.as_str() {
        "openai" => openai
            .clone()
            .ok_or_else(|| AppError::Config("OpenAI API key is required".into()))?,
        "anthropic" => anthropic
            .clone()
            .ok_or_else(|| AppError::Config("Anthropic API key is required".into()))?,
        "heuristic" => heuristic.clone(),
        other => return Err(AppError::Config(format!("Unknown AI provider: {}", other))),
    };
    let embedder = openai.unwrap_or_else(|| heuristic.clone());

    Ok(AiProviders {
        primary,
        anthropic,
        embedder,
    })
}

/// 按字符截断，保证不会切断 UTF-8 字符
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 从模型输出中提取 JSON（支持 ```json 代码块或夹杂说明文字的输出）
pub fn extract_json(output: &str) -> Result<serde_json::Value> {
    let trimmed = output.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let body = match trimmed.find("```") {
        Some(start) => {
            let rest = &trimmed[start + 3..];
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            match rest.find("```") {
                Some(end) => &rest[..end],
                None => rest,
            }
        }
        None => trimmed,
    };
    if let Ok(value) = serde_json::from_str(body.trim()) {
        return Ok(value);
    }

    let start = body.find(['{', '[']);
    let end = body.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&body[s..=e])
            .map_err(|e| AppError::AiProvider(format!("Invalid JSON in model output: {}", e))),
        _ => Err(AppError::AiProvider(
            "Model output did not contain JSON".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"a": 1}"#)]
    #[case("```json\n{\"a\": 1}\n```")]
    #[case("Here is the summary:\n{\"a\": 1}\nHope this helps.")]
    fn test_extract_json(#[case] output: &str) {
        assert_eq!(extract_json(output).unwrap()["a"], 1);
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert!(extract_json("no structured data here").is_err());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("论文摘要", 2), "论文");
    }

    #[test]
    fn test_create_providers() {
        let config = AiConfig::default();
        let providers = create_providers(&config).unwrap();
        assert_eq!(providers.primary.name(), "heuristic");
        assert!(providers.anthropic.is_none());

        let config = AiConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        assert!(create_providers(&config).is_err());

        let config = AiConfig {
            provider: "openai".into(),
            openai_api_key: Some("sk-test".into()),
            anthropic_api_key: Some("ak-test".into()),
            ..Default::default()
        };
        let providers = create_providers(&config).unwrap();
        assert_eq!(providers.primary.name(), "openai");
        assert_eq!(providers.embedder.name(), "openai");
        assert!(providers.anthropic.is_some());
    }
}
