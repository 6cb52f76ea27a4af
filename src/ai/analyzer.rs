//! 论文 AI 分析
//!
//! 组装提示词、路由到具体提供方、解析模型输出，并记录调用指标。

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{AiProvider, AiProviders, CompletionRequest, Operation, extract_json, truncate_chars};
use crate::config::config::AiConfig;
use crate::error::{AppError, Result};
use crate::models::{KeyInsight, PaperContribution, PaperSummary};
use crate::observability::AppMetrics;

/// 向量化输入的最大字符数
pub const EMBEDDING_INPUT_LIMIT: usize = 8000;

/// 默认洞见数量上限
pub const MAX_INSIGHTS: usize = 7;

/// 单篇论文的完整分析结果
#[derive(Debug, Clone, Serialize)]
pub struct PaperAnalysis {
    pub summary: PaperSummary,
    pub insights: Vec<KeyInsight>,
    pub methodology: String,
    pub limitations: String,
    pub contributions: Vec<PaperContribution>,
}

/// 批量分析输入
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub content: String,
}

/// 批量分析中单篇论文的结果，失败时只有 `error`
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub paper_id: String,
    pub index: usize,
    pub summary: Option<PaperSummary>,
    pub insights: Vec<KeyInsight>,
    pub embedding: Option<Vec<f32>>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AiAnalyzer {
    providers: AiProviders,
    metrics: Arc<AppMetrics>,
    max_paper_length: usize,
    batch_size: usize,
}

impl AiAnalyzer {
    pub fn new(providers: AiProviders, config: &AiConfig, metrics: Arc<AppMetrics>) -> Self {
        Self {
            providers,
            metrics,
            max_paper_length: config.max_paper_length,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.providers.primary.name()
    }

    /// claude 开头的模型走 Anthropic（已配置时），其余走默认提供方
    fn route(&self, model: Option<&str>) -> &Arc<dyn AiProvider> {
        match (model, &self.providers.anthropic) {
            (Some(m), Some(anthropic)) if m.starts_with("claude") => anthropic,
            (Some(m), None) if m.starts_with("claude") => {
                warn!(model = m, "Anthropic provider not configured, using default provider");
                &self.providers.primary
            }
            _ => &self.providers.primary,
        }
    }

    async fn run(&self, mut request: CompletionRequest) -> Result<String> {
        let provider = self.route(request.model.as_deref());
        // 回退到默认提供方时不能沿用 claude 模型名
        if provider.name() != "anthropic"
            && request.model.as_deref().is_some_and(|m| m.starts_with("claude"))
        {
            request.model = None;
        }

        let operation = request.operation.to_string();
        let start = Instant::now();
        let result = provider.complete(&request).await;
        let elapsed = start.elapsed().as_secs_f64();

        self.metrics
            .record_ai_request(&operation, result.is_ok(), elapsed);
        match &result {
            Ok(_) => info!(
                operation = %operation,
                provider = provider.name(),
                content_length = request.content.len(),
                duration_secs = elapsed,
                "AI request completed"
            ),
            Err(e) => error!(
                operation = %operation,
                provider = provider.name(),
                error = %e,
                "AI request failed"
            ),
        }
        result
    }

    fn request(
        &self,
        operation: Operation,
        title: &str,
        content: String,
        prompt: String,
        temperature: f32,
        max_tokens: u32,
    ) -> CompletionRequest {
        CompletionRequest {
            operation,
            title: title.to_string(),
            content,
            prompt,
            model: None,
            temperature,
            max_tokens,
        }
    }

    /// 生成结构化摘要
    pub async fn summarize(
        &self,
        title: &str,
        authors: &[String],
        content: &str,
        model: Option<&str>,
    ) -> Result<PaperSummary> {
        let mut prepared = format!("Title: {}\n\n", title);
        if !authors.is_empty() {
            prepared.push_str(&format!("Authors: {}\n\n", authors.join(", ")));
        }
        prepared.push_str(truncate_chars(content, self.max_paper_length));

        let prompt = format!(
            r#"Analyze this academic paper and provide a comprehensive summary in JSON format:

{prepared}

Return a JSON object with this exact structure:
{{
    "research_question": "What is the main research question or problem addressed?",
    "methodology": "Brief description of the research methods and approach used",
    "key_findings": ["Finding 1", "Finding 2", "Finding 3"],
    "limitations": ["Limitation 1", "Limitation 2"],
    "significance": "Why this research is important and its contribution to the field",
    "future_work": ["Future direction 1", "Future direction 2"],
    "confidence_score": 0.85
}}

Guidelines:
- Be specific and accurate
- Focus on the most important aspects
- Limit key_findings to 3-5 items
- Limit limitations to 2-4 items
- Limit future_work to 2-3 items
- Confidence score should reflect how well the paper is understood (0.0-1.0)"#
        );

        let mut request =
            self.request(Operation::Summarize, title, prepared, prompt, 0.2, 1200);
        request.model = model.map(str::to_string);
        let output = self.run(request).await?;

        let mut summary: PaperSummary = serde_json::from_value(extract_json(&output)?)
            .map_err(|e| AppError::AiProvider(format!("Malformed summary: {}", e)))?;
        summary.confidence_score = summary.confidence_score.clamp(0.0, 1.0);
        Ok(summary)
    }

    /// 提取关键洞见，按相关度降序，最多 `max_insights` 条
    pub async fn extract_insights(
        &self,
        title: &str,
        content: &str,
        max_insights: usize,
    ) -> Result<Vec<KeyInsight>> {
        let content = truncate_chars(content, self.max_paper_length).to_string();
        let prompt = format!(
            r#"Extract {max_insights} key insights from this academic paper that would be valuable for researchers:

Title: {title}
Content: {content}

Return as a JSON array of objects with this structure:
[
    {{
        "insight": "The specific insight or finding",
        "relevance_score": 0.9,
        "section": "Results",
        "page_number": 5
    }}
]

Focus on novel findings, methodological innovations, practical implications,
theoretical contributions, limitations and future work, surprising results
and connections to other research areas.

Ensure insights are specific, actionable, and ranked by relevance (0.0-1.0)."#
        );

        let output = self
            .run(self.request(Operation::Insights, title, content, prompt, 0.3, 1000))
            .await?;
        let mut insights: Vec<KeyInsight> = serde_json::from_value(extract_json(&output)?)
            .map_err(|e| AppError::AiProvider(format!("Malformed insights: {}", e)))?;

        for insight in &mut insights {
            insight.relevance_score = insight.relevance_score.clamp(0.0, 1.0);
        }
        insights.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        insights.truncate(max_insights);
        Ok(insights)
    }

    /// 方法论分析
    pub async fn analyze_methodology(&self, title: &str, content: &str) -> Result<String> {
        let content = truncate_chars(content, self.max_paper_length).to_string();
        let prompt = format!(
            r#"Analyze the methodology section of this academic paper and provide a comprehensive summary:

Title: {title}
Content: {content}

Provide a detailed analysis covering research design and approach, data collection
methods, sample size and selection criteria, analytical techniques, tools and software,
experimental setup, controls and variables, and validation methods.

Focus on being specific and technical while remaining accessible."#
        );

        let output = self
            .run(self.request(Operation::Methodology, title, content, prompt, 0.2, 800))
            .await?;
        Ok(output.trim().to_string())
    }

    /// 局限性分析
    pub async fn identify_limitations(&self, title: &str, content: &str) -> Result<String> {
        let content = truncate_chars(content, self.max_paper_length).to_string();
        let prompt = format!(
            r#"Identify and analyze the limitations of this academic paper:

Title: {title}
Content: {content}

Analyze both explicitly stated limitations and potential implicit limitations:
methodological limitations, sample size or selection, data quality or availability,
scope and generalizability, temporal limitations, technical or resource constraints,
potential biases, and areas not addressed.

Be constructive and specific in identifying limitations."#
        );

        let output = self
            .run(self.request(Operation::Limitations, title, content, prompt, 0.3, 600))
            .await?;
        Ok(output.trim().to_string())
    }

    /// 提取论文贡献
    pub async fn extract_contributions(
        &self,
        title: &str,
        content: &str,
    ) -> Result<Vec<PaperContribution>> {
        let content = truncate_chars(content, self.max_paper_length).to_string();
        let prompt = format!(
            r#"Extract the key contributions of this academic paper:

Title: {title}
Content: {content}

Return as a JSON array of objects with this structure:
[
    {{
        "contribution": "Specific contribution description",
        "type": "theoretical/empirical/methodological/practical",
        "significance": 0.8
    }}
]

Theoretical: new theories, frameworks, models. Empirical: new findings, evidence, data.
Methodological: new methods, tools, techniques. Practical: applications, implementations.
Rate significance from 0.0 (minor) to 1.0 (major breakthrough)."#
        );

        let output = self
            .run(self.request(Operation::Contributions, title, content, prompt, 0.2, 800))
            .await?;
        serde_json::from_value(extract_json(&output)?)
            .map_err(|e| AppError::AiProvider(format!("Malformed contributions: {}", e)))
    }

    /// 短文本摘要（知识条目使用）
    pub async fn summarize_text(&self, text: &str) -> Result<String> {
        let content = truncate_chars(text, self.max_paper_length).to_string();
        let prompt = format!(
            "Summarize the following note in 2-3 concise sentences:\n\n{}",
            content
        );
        let output = self
            .run(self.request(Operation::SummarizeText, "", content, prompt, 0.3, 300))
            .await?;
        Ok(output.trim().to_string())
    }

    /// 生成向量（输入截断到 8000 字符）
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_chars(text, EMBEDDING_INPUT_LIMIT);
        let start = Instant::now();
        let result = self.providers.embedder.embed(text).await;
        self.metrics
            .record_ai_request("embedding", result.is_ok(), start.elapsed().as_secs_f64());
        if let Ok(vector) = &result {
            info!(text_length = text.len(), dimension = vector.len(), "Generated embedding");
        }
        result
    }

    /// 完整分析：摘要、洞见、方法论、局限性、贡献并发执行
    pub async fn analyze_paper(
        &self,
        title: &str,
        authors: &[String],
        content: &str,
    ) -> Result<PaperAnalysis> {
        let (summary, insights, methodology, limitations, contributions) = tokio::try_join!(
            self.summarize(title, authors, content, None),
            self.extract_insights(title, content, MAX_INSIGHTS),
            self.analyze_methodology(title, content),
            self.identify_limitations(title, content),
            self.extract_contributions(title, content),
        )?;

        Ok(PaperAnalysis {
            summary,
            insights,
            methodology,
            limitations,
            contributions,
        })
    }

    async fn analyze_batch_item(&self, item: &BatchItem) -> Result<(PaperSummary, Vec<KeyInsight>, Vec<f32>)> {
        let summary = self
            .summarize(&item.title, &item.authors, &item.content, None)
            .await?;
        let insights = self
            .extract_insights(&item.title, &item.content, MAX_INSIGHTS)
            .await?;
        let embedding = self
            .embed(&format!("{} {}", item.title, item.content))
            .await?;
        Ok((summary, insights, embedding))
    }

    /// 批量分析
    ///
    /// 每组 `batch_size` 篇并发执行，组与组之间串行；单篇失败不影响其他论文。
    pub async fn analyze_batch(&self, items: &[BatchItem]) -> Vec<BatchOutcome> {
        info!(papers = items.len(), batch_size = self.batch_size, "Starting batch analysis");
        let mut outcomes = Vec::with_capacity(items.len());

        for (chunk_index, chunk) in items.chunks(self.batch_size).enumerate() {
            let results = join_all(chunk.iter().map(|item| self.analyze_batch_item(item))).await;

            for (offset, (item, result)) in chunk.iter().zip(results).enumerate() {
                let index = chunk_index * self.batch_size + offset;
                let outcome = match result {
                    Ok((summary, insights, embedding)) => BatchOutcome {
                        paper_id: item.paper_id.clone(),
                        index,
                        summary: Some(summary),
                        insights,
                        embedding: Some(embedding),
                        error: None,
                    },
                    Err(e) => {
                        error!(paper_id = %item.paper_id, error = %e, "Failed to analyze paper in batch");
                        BatchOutcome {
                            paper_id: item.paper_id.clone(),
                            index,
                            summary: None,
                            insights: Vec::new(),
                            embedding: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                outcomes.push(outcome);
            }
        }

        info!(results = outcomes.len(), "Batch analysis completed");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AnthropicProvider, HeuristicProvider, create_providers};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTENT: &str = "We study retrieval augmented generation for scientific question answering. \
        We propose a novel retrieval method using citation graphs. \
        Experiments show that the approach improves accuracy by 12 points. \
        However, evaluation is limited to computer science papers.";

    fn analyzer() -> AiAnalyzer {
        let config = AiConfig::default();
        AiAnalyzer::new(
            create_providers(&config).unwrap(),
            &config,
            Arc::new(AppMetrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_analyze_paper_with_heuristic_provider() {
        let analyzer = analyzer();
        let analysis = analyzer
            .analyze_paper("Citation RAG", &["A. Author".to_string()], CONTENT)
            .await
            .unwrap();

        assert!(!analysis.summary.key_findings.is_empty());
        assert!(analysis.insights.len() <= MAX_INSIGHTS);
        assert!(analysis
            .insights
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert!(!analysis.methodology.is_empty());
        assert!(!analysis.contributions.is_empty());
    }

    #[tokio::test]
    async fn test_claude_models_route_to_anthropic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(serde_json::json!({"model": "claude-3-opus-20240229"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "```json\n{\"research_question\": \"Does RAG help?\", \"confidence_score\": 1.7}\n```"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = AiConfig {
            anthropic_base_url: server.uri(),
            ..Default::default()
        };
        let providers = AiProviders {
            primary: Arc::new(HeuristicProvider),
            anthropic: Some(Arc::new(AnthropicProvider::new(&config, "ak-test").unwrap())),
            embedder: Arc::new(HeuristicProvider),
        };
        let analyzer = AiAnalyzer::new(providers, &config, Arc::new(AppMetrics::new().unwrap()));

        let summary = analyzer
            .summarize("Citation RAG", &[], CONTENT, Some("claude-3-opus-20240229"))
            .await
            .unwrap();
        assert_eq!(summary.research_question, "Does RAG help?");
        assert_eq!(summary.confidence_score, 1.0);
        assert!(summary.key_findings.is_empty());
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order() {
        let analyzer = analyzer();
        let items = vec![
            BatchItem {
                paper_id: "p1".into(),
                title: "Citation RAG".into(),
                authors: vec![],
                content: CONTENT.into(),
            },
            BatchItem {
                paper_id: "p2".into(),
                title: "Empty".into(),
                authors: vec![],
                content: String::new(),
            },
        ];

        let outcomes = analyzer.analyze_batch(&items).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_none());
        assert_eq!(outcomes[0].embedding.as_ref().unwrap().len(), 256);
        assert_eq!(outcomes[1].index, 1);
    }

    #[tokio::test]
    async fn test_embed_truncates_input() {
        let analyzer = analyzer();
        let long = "token ".repeat(5000);
        let vector = analyzer.embed(&long).await.unwrap();
        assert_eq!(vector.len(), 256);
    }
}
