use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::reply::{Reply, ReplyMarkup};
use crate::models::telegram::{TelegramResponse, TelegramUpdate, WebhookInfo};
use crate::services::conversation::ReplySink;

/// Bot API limit for a single message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    token: String,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: String, client: Client) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(&config.telegram_api_url, config.telegram_bot_token.clone(), client)
            .with_timeout(config.http_timeout())
    }

    /// Total time allowed for one API call; `getUpdates` adds its poll window on top.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &JsonValue,
        timeout: Duration,
    ) -> Result<T> {
        let res = self
            .client
            .post(self.method_url(method))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;

        let parsed: TelegramResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(Error::upstream("telegram", status.as_u16(), text));
            }
            Err(e) => return Err(Error::malformed(format!("telegram {}: {}", method, e))),
        };

        if !parsed.ok {
            let description = parsed.description.unwrap_or_else(|| status.to_string());
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(Error::upstream("telegram", status.as_u16(), description));
            }
            return Err(Error::Telegram(format!("{}: {}", method, description)));
        }
        parsed
            .result
            .ok_or_else(|| Error::malformed(format!("telegram {}: missing result", method)))
    }

    /// Sends `text`, split into Bot API sized parts; the keyboard goes with the last part.
    pub async fn send_message(&self, chat_id: i64, text: &str, markup: ReplyMarkup) -> Result<()> {
        let parts = split_message(text, MAX_MESSAGE_CHARS);
        let last = parts.len().saturating_sub(1);

        for (i, part) in parts.iter().enumerate() {
            let mut body = json!({
                "chat_id": chat_id,
                "text": part,
            });
            if i == last {
                if let Some(markup) = markup.to_telegram() {
                    body["reply_markup"] = markup;
                }
            }
            let _: JsonValue = self.call("sendMessage", &body, self.timeout).await?;
        }
        tracing::debug!(chat_id, parts = parts.len(), "Telegram message sent");
        Ok(())
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<TelegramUpdate>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call(
            "getUpdates",
            &body,
            self.timeout + Duration::from_secs(timeout_secs),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<()> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message"],
        });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", &body, self.timeout).await?;
        Ok(())
    }

    pub async fn webhook_info(&self) -> Result<WebhookInfo> {
        self.call("getWebhookInfo", &json!({}), self.timeout).await
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", &json!({ "drop_pending_updates": false }), self.timeout)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplySink for TelegramClient {
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<()> {
        self.send_message(chat_id, &reply.text, reply.markup).await
    }
}

/// Cuts `text` into parts of at most `max_chars` characters, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let mut cut = end;
        if end < chars.len() {
            if let Some(pos) = chars[start..end].iter().rposition(|c| *c == '\n') {
                if pos > 0 {
                    cut = start + pos + 1;
                }
            }
        }
        let part: String = chars[start..cut].iter().collect();
        let part = part.trim_end_matches('\n');
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        start = cut;
    }
    parts
}
