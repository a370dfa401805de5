use crate::config::Config;
use crate::error::{Error, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Clone)]
pub struct EmbedService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl EmbedService {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.mistral.ai/v1".to_string(),
            model: "mistral-embed".to_string(),
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(config.mistral_api_key.clone(), client)
            .with_endpoint(&config.completion_base_url, &config.embedding_model)
    }

    pub fn with_endpoint(mut self, base_url: &str, model: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.model = model.to_string();
        self
    }

    pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
        let mut dot = 0f32;
        let mut na = 0f32;
        let mut nb = 0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na.sqrt() * nb.sqrt())
        }
    }
}

#[async_trait]
impl Embedder for EmbedService {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct EmbReq<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct EmbData {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct EmbResp {
            data: Vec<EmbData>,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbReq {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .context("embeddings request failed")?;

        let status = resp.status();
        let txt = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::upstream("embeddings", status.as_u16(), txt));
        }
        let parsed: EmbResp = serde_json::from_str(&txt)
            .map_err(|e| Error::malformed(format!("embeddings parse failed: {}", e)))?;
        if parsed.data.len() != texts.len() {
            return Err(Error::malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
