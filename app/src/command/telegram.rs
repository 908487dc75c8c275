use crate::command::{CommandStrategy, init_common_components};
use llmroom_telegram::{TelegramBot, TelegramTransport};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::info;

/// Input for Telegram bot command.
pub struct TelegramInput {
    pub config_path: Option<PathBuf>,
    /// Optional bot token (overrides config)
    pub token: Option<String>,
}

/// Strategy for running Telegram bot.
pub struct TelegramStrategy;

impl CommandStrategy for TelegramStrategy {
    type Input = TelegramInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let common = init_common_components(input.config_path.as_deref()).await?;

        let token = if let Some(t) = input.token {
            t
        } else if !common.config.telegram.token.is_empty() {
            common.config.telegram.token.clone()
        } else {
            anyhow::bail!("Telegram bot token not configured. Set \"telegram.token\" in config");
        };

        info!("Starting Telegram bot...");

        let bot = Bot::new(token);
        let transport = Arc::new(TelegramTransport::new(bot.clone()));
        let service = Arc::new(common.into_service(transport));

        info!("Telegram bot is running. Press Ctrl+C to stop.");
        TelegramBot::new(bot, service).run().await?;

        Ok(())
    }
}
