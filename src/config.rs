use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Where interview questions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionSourceKind {
    /// Generated from the knowledge base through the retrieval service.
    Retrieval,
    /// Static per-topic, per-level question bank.
    Template,
}

impl FromStr for QuestionSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retrieval" | "rag" => Ok(Self::Retrieval),
            "template" | "static" => Ok(Self::Template),
            other => Err(format!("unknown question source '{}'", other)),
        }
    }
}

/// Where theory answers look for grounding documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSourceKind {
    Arxiv,
    KnowledgeBase,
}

impl FromStr for ReferenceSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arxiv" => Ok(Self::Arxiv),
            "knowledge_base" | "local" => Ok(Self::KnowledgeBase),
            other => Err(format!("unknown reference source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub telegram_webhook_url: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub mistral_api_key: String,
    pub completion_base_url: String,
    pub completion_model: String,
    pub completion_temperature: f32,
    pub completion_max_tokens: Option<u32>,
    pub http_timeout_secs: u64,
    pub embedding_model: String,
    pub question_source: QuestionSourceKind,
    pub reference_source: ReferenceSourceKind,
    pub knowledge_base_dir: String,
    pub arxiv_base_url: String,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,
    pub session_idle_secs: u64,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        Ok(Self {
            server_address: vars.get_or("SERVER_ADDRESS", "0.0.0.0:8080"),
            telegram_bot_token: vars.get("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: vars.get_or("TELEGRAM_API_URL", "https://api.telegram.org"),
            telegram_webhook_url: vars.optional("TELEGRAM_WEBHOOK_URL"),
            telegram_webhook_secret: vars.optional("TELEGRAM_WEBHOOK_SECRET"),
            mistral_api_key: vars.get("MISTRAL_API_KEY")?,
            completion_base_url: vars.get_or("COMPLETION_BASE_URL", "https://api.mistral.ai/v1"),
            completion_model: vars.get_or("COMPLETION_MODEL", "mistral-small-latest"),
            completion_temperature: vars.parse_or("COMPLETION_TEMPERATURE", 0.7)?,
            completion_max_tokens: vars.parse_optional("COMPLETION_MAX_TOKENS")?,
            http_timeout_secs: vars.parse_or("HTTP_TIMEOUT_SECS", 30)?,
            embedding_model: vars.get_or("EMBEDDING_MODEL", "mistral-embed"),
            question_source: vars.parse_or("QUESTION_SOURCE", QuestionSourceKind::Retrieval)?,
            reference_source: vars.parse_or("REFERENCE_SOURCE", ReferenceSourceKind::Arxiv)?,
            knowledge_base_dir: vars.get_or("KNOWLEDGE_BASE_DIR", "rag_data"),
            arxiv_base_url: vars.get_or("ARXIV_BASE_URL", "http://export.arxiv.org/api"),
            retry_max_attempts: vars.parse_or("RETRY_MAX_ATTEMPTS", 5)?,
            retry_base_delay_ms: vars.parse_or("RETRY_BASE_DELAY_MS", 1_000)?,
            retry_max_delay_ms: vars.parse_or("RETRY_MAX_DELAY_MS", 10_000)?,
            retry_jitter: vars.parse_or("RETRY_JITTER", false)?,
            session_idle_secs: vars.parse_or("SESSION_IDLE_SECS", 600)?,
            log_format: vars.parse_or("LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn get(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::Config(format!("Missing environment variable: {}", name)))
    }

    fn get_or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_optional<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
            None => Ok(None),
        }
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_optional(name)?.unwrap_or(default))
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("MISTRAL_API_KEY", "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.completion_model, "mistral-small-latest");
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_base_delay_ms, 1_000);
        assert_eq!(config.retry_max_delay_ms, 10_000);
        assert_eq!(config.question_source, QuestionSourceKind::Retrieval);
        assert_eq!(config.reference_source, ReferenceSourceKind::Arxiv);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(config.telegram_webhook_url.is_none());
    }

    #[test]
    fn missing_bot_token_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[("MISTRAL_API_KEY", "sk-test")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("MISTRAL_API_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("MISTRAL_API_KEY")));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("MISTRAL_API_KEY", "sk-test"),
            ("RETRY_MAX_ATTEMPTS", "five"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("RETRY_MAX_ATTEMPTS")));
    }

    #[test]
    fn source_kinds_parse_from_env() {
        let config = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("MISTRAL_API_KEY", "sk-test"),
            ("QUESTION_SOURCE", "Template"),
            ("REFERENCE_SOURCE", "knowledge_base"),
            ("LOG_FORMAT", "json"),
            ("COMPLETION_MAX_TOKENS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.question_source, QuestionSourceKind::Template);
        assert_eq!(config.reference_source, ReferenceSourceKind::KnowledgeBase);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.completion_max_tokens, Some(500));
    }
}
