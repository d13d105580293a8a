//! HTTP executor for OpenAI-compatible chat completion APIs.
//!
//! Works with hosted APIs and local servers (llama.cpp, vLLM, Ollama's
//! `/v1` endpoint) that implement `POST /chat/completions`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ExecutionRequest, Executor, ExecutorOutput};

/// Chat completions client
pub struct HttpExecutor {
    /// API root, e.g. `https://api.openai.com/v1`
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

impl HttpExecutor {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutorOutput> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.prompt },
            ],
        });

        let response = self
            .authorized(self.client.post(self.api_url("chat/completions")))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Chat completion request for task '{}' failed", request.task))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion API returned {}: {}", status, text.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Chat completion response has no content")?;

        Ok(ExecutorOutput {
            content,
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
        })
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .authorized(self.client.get(self.api_url("models")))
            .send()
            .await
            .context("Failed to reach chat completion API")?;

        if !response.status().is_success() {
            anyhow::bail!("Chat completion API health check returned {}", response.status());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let executor = HttpExecutor::new(
            "http://localhost:8080/v1/".to_string(),
            "llama3".to_string(),
            None,
        );
        assert_eq!(
            executor.api_url("chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(executor.name(), "http");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"classes\": []}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"classes\": []}"));
        assert_eq!(parsed.usage.unwrap().total_tokens, Some(15));
    }
}
