use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchboard_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Chat-completions client for OpenAI and any server speaking the same wire
/// format (Ollama exposes it under `/v1`).
#[derive(Clone, Debug)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (config.base_url.as_deref(), config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, LlmProvider::Ollama) => "http://localhost:11434".to_string(),
        };
        let endpoint = match config.provider {
            LlmProvider::OpenAi => format!("{base_url}/chat/completions"),
            LlmProvider::Ollama => format!("{base_url}/v1/chat/completions"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self { client, endpoint, model: config.model.clone(), api_key: config.api_key.clone() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("llm request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm endpoint returned {status}: {detail}"));
        }

        let parsed: ChatResponse = response.json().await.context("llm response was not valid json")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("llm response contained no choices"))
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::config::{AppConfig, LlmProvider};

    use super::OpenAiCompatibleClient;

    #[test]
    fn endpoint_follows_provider_wire_layout() {
        let mut config = AppConfig::default().llm;
        let openai = OpenAiCompatibleClient::from_config(&config).expect("client");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");

        config.provider = LlmProvider::Ollama;
        config.base_url = Some("http://localhost:11434/".to_string());
        let ollama = OpenAiCompatibleClient::from_config(&config).expect("client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
