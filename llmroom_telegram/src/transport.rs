use async_trait::async_trait;
use llmroom_core::{ChatTransport, InboundMessage};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId};

use crate::{Error, Result};

/// Longest text Telegram accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Sends replies into Telegram chats.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn chat_id(room_id: &str) -> Result<ChatId> {
        room_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| Error::InvalidChatId(room_id.to_string()))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    /// Telegram bots cannot mark messages as read; the typing indicator is
    /// the closest acknowledgement.
    async fn mark_read(&self, message: &InboundMessage) -> anyhow::Result<()> {
        let chat_id = Self::chat_id(&message.room_id)?;
        self.bot
            .send_chat_action(chat_id, ChatAction::Typing)
            .await?;
        Ok(())
    }

    async fn respond(&self, room_id: &str, text: &str) -> anyhow::Result<()> {
        let chat_id = Self::chat_id(room_id)?;
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.bot.send_message(chat_id, chunk).await?;
        }
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, preferring to
/// break after a newline.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let cut = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(i, _)| i);
        let split = rest[..cut]
            .rfind('\n')
            .filter(|&i| i > 0)
            .map_or(cut, |i| i + 1);

        let chunk = rest[..split].trim_end_matches('\n');
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = &rest[split..];
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
