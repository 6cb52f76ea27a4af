//! Anthropic 客户端（messages API）

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{AiProvider, CompletionRequest};
use crate::config::config::AiConfig;
use crate::error::{AppError, Result};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(config: &AiConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            default_model: config.anthropic_model.clone(),
        })
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&serde_json::json!({
                "model": model,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
                "messages": [{"role": "user", "content": request.prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::AiProvider(format!(
                "Anthropic request failed ({}): {}",
                status, error_text
            )));
        }

        let body: MessagesResponse = response.json().await?;
        let text: String = body.content.into_iter().filter_map(|b| b.text).collect();
        if text.is_empty() {
            return Err(AppError::AiProvider("Anthropic returned no content".into()));
        }
        Ok(text)
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::AiProvider(
            "Anthropic does not provide an embeddings endpoint".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Operation;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_uses_messages_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Limited sample size."}]
            })))
            .mount(&server)
            .await;

        let config = AiConfig {
            anthropic_base_url: server.uri(),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(&config, "ak-test").unwrap();
        let request = CompletionRequest {
            operation: Operation::Limitations,
            title: "t".into(),
            content: "c".into(),
            prompt: "List limitations".into(),
            model: Some("claude-3-haiku-20240307".into()),
            temperature: 0.3,
            max_tokens: 600,
        };

        assert_eq!(provider.complete(&request).await.unwrap(), "Limited sample size.");
        assert!(provider.embed("x").await.is_err());
    }
}
