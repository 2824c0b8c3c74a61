//! Telegram delivery using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, LinkPreviewOptions, MessageId, ParseMode, ReplyParameters};
use tracing::{info, warn};

use crate::answer::AnswerFormat;
use crate::request::Destination;

/// Sending the answer failed or Telegram rejected it.
#[derive(Debug)]
pub enum DeliveryError {
    Telegram(String),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Telegram(e) => write!(f, "Telegram error: {e}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Where answers are delivered.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` and return the new message id.
    async fn send_message(
        &self,
        destination: &Destination,
        text: &str,
        format: AnswerFormat,
        reply_to_message_id: Option<i32>,
    ) -> Result<i64, DeliveryError>;

    async fn send_typing(&self, destination: &Destination) -> Result<(), DeliveryError>;
}

/// Telegram Bot API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }

    /// Talk to a different Bot API server (local bot API, test servers).
    pub fn with_api_url(token: &str, api_url: reqwest::Url) -> Self {
        Self {
            bot: Bot::new(token).set_api_url(api_url),
        }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        destination: &Destination,
        text: &str,
        format: AnswerFormat,
        reply_to_message_id: Option<i32>,
    ) -> Result<i64, DeliveryError> {
        // Citation links would otherwise each pull in a preview card.
        let mut request = self
            .bot
            .send_message(destination.recipient(), text)
            .link_preview_options(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            });

        if format == AnswerFormat::MarkdownV2 {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id));
            request = request.reply_parameters(reply_params);
        }

        let message = request.await.map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            DeliveryError::Telegram(msg)
        })?;

        info!("📤 Sent message {} to {}", message.id.0, destination);
        Ok(message.id.0 as i64)
    }

    async fn send_typing(&self, destination: &Destination) -> Result<(), DeliveryError> {
        self.bot
            .send_chat_action(destination.recipient(), ChatAction::Typing)
            .await
            .map_err(|e| DeliveryError::Telegram(format!("Failed to send typing action: {e}")))?;
        Ok(())
    }
}
