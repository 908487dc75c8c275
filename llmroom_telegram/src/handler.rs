use crate::{Result, TelegramBot};
use llmroom_conversation::Outcome;
use llmroom_core::InboundMessage;
use teloxide::types::Message;
use tracing::{debug, error, info};

/// Converts a Telegram message into an inbound chat message.
///
/// Returns `None` for messages without text or without a sending user.
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;
    let sender = msg.from.as_ref()?.id.0.to_string();
    Some(InboundMessage::new(sender, msg.chat.id.0.to_string(), text))
}

/// Handle any message (commands or regular text)
pub async fn handle_message(bot: TelegramBot, msg: Message) -> Result<()> {
    let Some(message) = to_inbound(&msg) else {
        debug!("Skipping non-text message in chat {}", msg.chat.id);
        return Ok(());
    };

    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .unwrap_or("unknown");

    match bot.service.on_message(&message).await {
        Ok(Outcome::Replied(completion)) => {
            info!(
                "[@{username}] Replied in chat {} ({} chars)",
                message.room_id,
                completion.content.chars().count()
            );
            Ok(())
        }
        Ok(Outcome::Ignored(reason)) => {
            debug!("[@{username}] Message ignored: {reason:?}");
            Ok(())
        }
        Err(e) => {
            error!("[@{username}] Failed to handle message in chat {}: {e}", message.room_id);
            Err(e.into())
        }
    }
}
