//! Administrative room commands, e.g. `!model gpt-4o` or `!room`.
//!
//! Commands change a room's overrides; they never touch its history.

use llmroom_core::{InboundMessage, OverrideChange, RoomOverrides};
use tracing::info;

use crate::orchestrator::{Components, OrchestratorError, OrchestratorSettings};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomCommand {
    SetBackend(String),
    ClearBackend,
    SetModel(String),
    ClearModel,
    SetSystemPrompt(String),
    ClearSystemPrompt,
    Info,
    Help,
    Unknown(String),
}

impl RoomCommand {
    /// Parses `body` if it starts with `prefix`.
    ///
    /// A trailing bot mention (`/help@my_bot`) is ignored.
    #[must_use]
    pub fn parse(body: &str, prefix: &str) -> Option<Self> {
        let rest = body.strip_prefix(prefix)?.trim();
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, arg)| (name, arg.trim()));
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        let command = match (name.as_str(), arg.is_empty()) {
            ("backend", true) => Self::ClearBackend,
            ("backend", false) => Self::SetBackend(arg.to_string()),
            ("model", true) => Self::ClearModel,
            ("model", false) => Self::SetModel(arg.to_string()),
            ("system", true) => Self::ClearSystemPrompt,
            ("system", false) => Self::SetSystemPrompt(arg.to_string()),
            ("room" | "info", _) => Self::Info,
            ("help" | "start", _) => Self::Help,
            _ => Self::Unknown(name),
        };
        Some(command)
    }

    #[must_use]
    pub fn help_text(prefix: &str) -> String {
        format!(
            "Commands:\n\
             {prefix}backend <key>   use another configured backend in this room\n\
             {prefix}model <name>    use another model in this room\n\
             {prefix}system <text>   replace the system prompt in this room\n\
             {prefix}backend, {prefix}model, {prefix}system without argument restore the default\n\
             {prefix}room            show the settings of this room\n\
             {prefix}help            show this help\n\
             \n\
             Any other message is answered by the assistant."
        )
    }
}

/// Executes room commands and replies through the transport.
pub struct RoomCommands {
    components: Components,
    default_backend: String,
    prefix: String,
}

impl RoomCommands {
    #[must_use]
    pub fn new(components: Components, settings: &OrchestratorSettings) -> Self {
        Self {
            components,
            default_backend: settings.default_backend.clone(),
            prefix: settings.command_prefix.clone(),
        }
    }

    /// Runs the command in `message`, if any, and sends the reply.
    ///
    /// The caller is responsible for authorizing the sender.
    pub async fn handle(&self, message: &InboundMessage) -> Result<(), OrchestratorError> {
        let Some(command) = RoomCommand::parse(&message.body, &self.prefix) else {
            return Ok(());
        };

        info!(
            "[{}] Command in room {}: {:?}",
            message.sender, message.room_id, command
        );
        let reply = self.execute(&message.room_id, command).await?;

        self.components
            .transport
            .respond(&message.room_id, &reply)
            .await
            .map_err(OrchestratorError::Transport)
    }

    /// Applies `command` to the room and returns the text to send back.
    pub async fn execute(
        &self,
        room_id: &str,
        command: RoomCommand,
    ) -> Result<String, OrchestratorError> {
        let reply = match command {
            RoomCommand::SetBackend(key) => {
                if let Err(e) = self.components.backends.resolve(&key) {
                    return Ok(format!("Cannot use backend `{key}`: {e}"));
                }
                self.update(
                    room_id,
                    RoomOverrides {
                        backend: OverrideChange::Set(key.clone()),
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                format!("Backend for this room set to `{key}`.")
            }
            RoomCommand::ClearBackend => {
                self.update(
                    room_id,
                    RoomOverrides {
                        backend: OverrideChange::Clear,
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                format!("Backend override cleared, using `{}`.", self.default_backend)
            }
            RoomCommand::SetModel(model) => {
                self.update(
                    room_id,
                    RoomOverrides {
                        model: OverrideChange::Set(model.clone()),
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                format!("Model for this room set to `{model}`.")
            }
            RoomCommand::ClearModel => {
                self.update(
                    room_id,
                    RoomOverrides {
                        model: OverrideChange::Clear,
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                "Model override cleared, using the backend default.".to_string()
            }
            RoomCommand::SetSystemPrompt(prompt) => {
                self.update(
                    room_id,
                    RoomOverrides {
                        system_prompt: OverrideChange::Set(prompt),
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                "System prompt for this room updated.".to_string()
            }
            RoomCommand::ClearSystemPrompt => {
                self.update(
                    room_id,
                    RoomOverrides {
                        system_prompt: OverrideChange::Clear,
                        ..RoomOverrides::default()
                    },
                )
                .await?;
                "System prompt override cleared, using the backend default.".to_string()
            }
            RoomCommand::Info => self.describe(room_id).await?,
            RoomCommand::Help => RoomCommand::help_text(&self.prefix),
            RoomCommand::Unknown(name) => format!(
                "Unknown command `{prefix}{name}`. Send `{prefix}help` for a list.",
                prefix = self.prefix
            ),
        };
        Ok(reply)
    }

    async fn update(&self, room_id: &str, overrides: RoomOverrides) -> Result<(), OrchestratorError> {
        self.components
            .rooms
            .update_overrides(room_id, &overrides)
            .await
            .map_err(OrchestratorError::Store)?;
        Ok(())
    }

    async fn describe(&self, room_id: &str) -> Result<String, OrchestratorError> {
        let room = self
            .components
            .rooms
            .get_or_create(room_id)
            .await
            .map_err(OrchestratorError::Store)?;
        let turns = self
            .components
            .context
            .count(room_id)
            .await
            .map_err(OrchestratorError::Store)?;

        let key = room.backend_key(&self.default_backend);
        let settings = match self.components.backends.resolve(key) {
            Ok(backend) => format!(
                "Model: {}\nSystem prompt: {}",
                room.effective_model(backend.as_ref()),
                room.effective_system_prompt(backend.as_ref())
            ),
            Err(e) => format!("Backend unavailable: {e}"),
        };
        let origin = |value: Option<&str>| match value {
            Some(v) if !v.is_empty() => "room override",
            _ => "default",
        };

        Ok(format!(
            "Room: {}\nBackend: {} ({})\n{}\nOverrides: model {}, system prompt {}\nStored turns: {}",
            room.room_id,
            key,
            if room.backend.is_some() { "room override" } else { "default" },
            settings,
            origin(room.model.as_deref()),
            origin(room.system_prompt.as_deref()),
            turns
        ))
    }
}
