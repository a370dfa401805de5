use serde::{Deserialize, Serialize};

use super::session::UserId;

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    pub r#type: String,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: u32,
}

/// A text message the conversation layer acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomingMessage {
    pub user_id: UserId,
    pub chat_id: i64,
    pub text: String,
}

impl TelegramUpdate {
    /// Text messages from users; everything else (stickers, bot senders, channel posts) is ignored.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let message = self.message?;
        let from = message.from?;
        if from.is_bot {
            return None;
        }
        let text = message.text?;
        Some(IncomingMessage {
            user_id: from.id,
            chat_id: message.chat.id,
            text,
        })
    }
}
