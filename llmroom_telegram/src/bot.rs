use crate::Result;
use crate::command::bot_commands;
use llmroom_conversation::RoomService;
use llmroom_providers::RetryPolicy;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::Message;
use tracing::{info, warn};

/// Long-polling Telegram bot that feeds chat messages to a [`RoomService`].
#[derive(Clone)]
pub struct TelegramBot {
    pub bot: Bot,
    pub service: Arc<RoomService>,
}

impl TelegramBot {
    #[must_use]
    pub const fn new(bot: Bot, service: Arc<RoomService>) -> Self {
        Self { bot, service }
    }

    /// Delays between `getMe` attempts before giving up: 2s, 4s, 6s, 8s, then 10s.
    fn connect_schedule() -> RetryPolicy {
        RetryPolicy::from_secs(&[2, 4, 6, 8, 10, 10, 10, 10, 10, 10])
    }

    /// Checks the token and the network path to the Bot API.
    async fn test_connection(&self) -> Result<()> {
        let schedule = Self::connect_schedule();
        info!(
            "Connecting to Telegram API (up to {} attempts)",
            schedule.attempts()
        );

        let me = schedule
            .run(|| self.bot.get_me().send())
            .await
            .inspect_err(|_| {
                warn!("Giving up on Telegram API. Check the bot token and access to api.telegram.org");
            })?;

        info!(
            "Connected to Telegram API: @{} (id: {})",
            me.user.username.as_deref().unwrap_or("no username"),
            me.user.id
        );
        Ok(())
    }

    /// Advertise the room commands in the client menu when they use `/`.
    async fn register_commands(&self) {
        if self.service.orchestrator().settings().command_prefix != "/" {
            return;
        }
        if let Err(e) = self.bot.set_my_commands(bot_commands()).await {
            warn!("Failed to register bot commands: {e}");
        }
    }

    /// Run the bot until interrupted.
    pub async fn run(self) -> Result<()> {
        use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
        use teloxide::dptree;
        use teloxide::types::Update;

        self.test_connection().await?;
        self.register_commands().await;

        let bot = self.bot.clone();

        let schema = dptree::entry().branch(Update::filter_message().endpoint({
            let bot_clone = self.clone();
            move |_bot: Bot, msg: Message| {
                let bot_clone = bot_clone.clone();
                async move { crate::handler::handle_message(bot_clone, msg).await }
            }
        }));

        info!("Listening for Telegram messages");

        Dispatcher::builder(bot, schema)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}
