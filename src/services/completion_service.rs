use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// Hosted language model: one system prompt, one user message, one answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client (Mistral by default).
#[derive(Clone)]
pub struct MistralCompletionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct RespChoiceMsg {
    content: Option<String>,
}

#[derive(Deserialize)]
struct RespChoice {
    message: RespChoiceMsg,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<RespChoice>,
}

impl MistralCompletionService {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.mistral.ai/v1".to_string(),
            model: "mistral-small-latest".to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(config.mistral_api_key.clone(), client)
            .with_base_url(&config.completion_base_url)
            .with_model(&config.completion_model)
            .with_sampling(config.completion_temperature, config.completion_max_tokens)
            .with_timeout(config.http_timeout())
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CompletionService for MistralCompletionService {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let req = Req {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                Msg {
                    role: "system",
                    content: system_prompt,
                },
                Msg {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), model = %self.model, "Completion request rejected");
            return Err(Error::upstream("completion", status.as_u16(), text));
        }

        let body: Resp = serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("completion body: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::malformed("completion returned no content"))
    }
}
