use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{service} returned status {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Reference answer unavailable for \"{question}\": {reason}")]
    AnswerUnavailable { question: String, reason: String },

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn upstream(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            service,
            status,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedResponse(message.into())
    }

    /// Network-level and upstream-overload failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Reqwest(_) | Error::Anyhow(_) | Error::AnswerUnavailable { .. } => true,
            Error::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the reliability wrapper should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Error::MalformedResponse(_) | Error::Json(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedResponse(_) | Error::Json(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Reqwest(err) => (
                StatusCode::BAD_GATEWAY,
                format!("External service error: {}", err),
            ),
            Error::Upstream { .. } | Error::Telegram(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_overload_is_transient() {
        assert!(Error::upstream("completion", 429, "slow down").is_transient());
        assert!(Error::upstream("completion", 503, "down").is_transient());
        assert!(!Error::upstream("completion", 401, "bad key").is_transient());
        assert!(!Error::upstream("completion", 400, "bad request").is_retryable());
    }

    #[test]
    fn malformed_data_is_retried_but_not_transient() {
        let err = Error::malformed("not json");
        assert!(err.is_retryable());
        assert!(!err.is_transient());
        assert!(err.is_malformed());
    }

    #[test]
    fn bot_api_rejections_are_final() {
        let err = Error::Telegram("sendMessage: Forbidden: bot was blocked by the user".into());
        assert!(!err.is_transient());
        assert!(!err.is_retryable());
    }

    #[test]
    fn configuration_errors_are_final() {
        let err = Error::Config("Missing environment variable: MISTRAL_API_KEY".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let response = Error::Unauthorized("invalid_webhook_secret".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
