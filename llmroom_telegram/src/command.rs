use teloxide::types::BotCommand;

/// Commands advertised in the Telegram client menu.
///
/// Only meaningful when the command prefix is `/`.
#[must_use]
pub fn bot_commands() -> Vec<BotCommand> {
    [
        ("backend", "Use another backend in this chat"),
        ("model", "Use another model in this chat"),
        ("system", "Replace the system prompt in this chat"),
        ("room", "Show the settings of this chat"),
        ("help", "Show help"),
    ]
    .into_iter()
    .map(|(command, description)| BotCommand {
        command: command.to_string(),
        description: description.to_string(),
    })
    .collect()
}
