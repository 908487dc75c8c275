use llmroom_conversation::OrchestratorError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] OrchestratorError),

    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),
}
