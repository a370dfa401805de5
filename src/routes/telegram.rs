use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::models::telegram::TelegramUpdate;
use crate::AppState;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Accepts an update from Telegram and queues it for the sender's worker.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> Result<impl IntoResponse> {
    if let Some(expected) = state.webhook_secret.as_deref() {
        verify_secret(&headers, expected)?;
    }

    let update_id = update.update_id;
    tracing::debug!(update_id, "Received Telegram webhook update");
    match update.into_incoming() {
        Some(msg) => state.dispatcher.dispatch(msg),
        None => tracing::debug!(update_id, "Ignoring update without text"),
    }

    Ok(StatusCode::OK)
}

fn verify_secret(headers: &HeaderMap, expected: &str) -> Result<()> {
    let Some(secret_hdr) = headers.get(SECRET_HEADER) else {
        return Err(Error::Unauthorized("missing_webhook_secret".into()));
    };
    let provided = secret_hdr
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::Unauthorized("invalid_webhook_secret".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn secret_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            verify_secret(&headers, "s3cret"),
            Err(Error::Unauthorized(msg)) if msg == "missing_webhook_secret"
        ));

        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cre"));
        assert!(verify_secret(&headers, "s3cret").is_err());

        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(verify_secret(&headers, "s3cret").is_ok());
    }
}
