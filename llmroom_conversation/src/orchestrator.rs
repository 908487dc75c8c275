//! Processing of one inbound chat message, from authorization to reply.

use llmroom_config::Config;
use llmroom_core::{
    Allowlist, ChatTransport, Completion, ConfigurationError, ContextStore, InboundMessage, Role,
    Room, RoomStore,
};
use llmroom_providers::BackendRegistry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::locks::RoomLocks;
use crate::window::ContextWindow;

/// Shown to the room when the backend fails and error replies are enabled.
pub const ERROR_REPLY: &str =
    "Sorry, I could not get an answer from the language model. Please try again later.";

/// Errors that abort the handling of one message.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Backend call failed: {0}")]
    Backend(anyhow::Error),

    #[error("Backend call timed out after {0:?}")]
    BackendTimeout(Duration),

    #[error("Backend returned an empty completion")]
    EmptyCompletion,

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Transport error: {0}")]
    Transport(anyhow::Error),
}

impl OrchestratorError {
    /// Whether the failure happened while talking to the provider.
    #[must_use]
    pub const fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::BackendTimeout(_) | Self::EmptyCompletion
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Unauthorized,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Replied(Completion),
}

/// Everything the orchestrator needs besides the message itself.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub allowlist: Allowlist,
    pub default_backend: String,
    pub command_prefix: String,
    pub error_reply: bool,
    pub backend_timeout: Option<Duration>,
    pub context_window: ContextWindow,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn new(allowlist: Allowlist, default_backend: impl Into<String>) -> Self {
        Self {
            allowlist,
            default_backend: default_backend.into(),
            command_prefix: "!".to_string(),
            error_reply: true,
            backend_timeout: None,
            context_window: ContextWindow::Unbounded,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowlist: config.allowlist.clone(),
            default_backend: config.default_backend.clone(),
            command_prefix: config.conversation.command_prefix.clone(),
            error_reply: config.conversation.error_reply,
            backend_timeout: config
                .conversation
                .backend_timeout_secs
                .map(Duration::from_secs),
            context_window: ContextWindow::from_limit(config.conversation.max_context_turns),
        }
    }

    #[must_use]
    pub fn is_command(&self, body: &str) -> bool {
        body.starts_with(&self.command_prefix)
    }
}

/// Shared collaborators, cheap to clone.
#[derive(Clone)]
pub struct Components {
    pub rooms: Arc<dyn RoomStore>,
    pub context: Arc<dyn ContextStore>,
    pub backends: Arc<BackendRegistry>,
    pub transport: Arc<dyn ChatTransport>,
    pub http: reqwest::Client,
}

/// Relays chat messages to the room's backend and keeps the room history.
///
/// Messages for the same room are processed one at a time; different rooms
/// proceed concurrently.
pub struct Orchestrator {
    components: Components,
    settings: OrchestratorSettings,
    locks: RoomLocks,
}

impl Orchestrator {
    #[must_use]
    pub fn new(components: Components, settings: OrchestratorSettings) -> Self {
        Self {
            components,
            settings,
            locks: RoomLocks::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Handles one inbound message.
    ///
    /// Once the user turn is stored it stays stored, whatever fails afterwards.
    pub async fn handle(&self, message: &InboundMessage) -> Result<Outcome, OrchestratorError> {
        if !self.settings.allowlist.is_allowed(&message.sender) {
            warn!(
                "Ignoring message from unauthorized sender {} in room {}",
                message.sender, message.room_id
            );
            return Ok(Outcome::Ignored(IgnoreReason::Unauthorized));
        }

        if self.settings.is_command(&message.body) {
            debug!("Leaving command in room {} to the command handler", message.room_id);
            return Ok(Outcome::Ignored(IgnoreReason::Command));
        }

        let _guard = self.locks.acquire(&message.room_id).await;
        info!("[{}] Message in room {}", message.sender, message.room_id);

        let room = self
            .components
            .rooms
            .get_or_create(&message.room_id)
            .await
            .map_err(OrchestratorError::Store)?;

        self.components
            .context
            .append(&room.room_id, Role::User, &message.body)
            .await
            .map_err(OrchestratorError::Store)?;

        if let Err(e) = self.components.transport.mark_read(message).await {
            warn!("Failed to acknowledge message in room {}: {e}", room.room_id);
        }

        let completion = match self.complete(&room).await {
            Ok(completion) => completion,
            Err(e) => {
                if e.is_backend_failure() && self.settings.error_reply {
                    self.send_error_reply(&room.room_id, &e).await;
                }
                return Err(e);
            }
        };

        self.components
            .context
            .append(&room.room_id, completion.role, &completion.content)
            .await
            .map_err(OrchestratorError::Store)?;

        self.components
            .transport
            .respond(&room.room_id, &completion.content)
            .await
            .map_err(OrchestratorError::Transport)?;

        info!("Replied in room {}", room.room_id);
        Ok(Outcome::Replied(completion))
    }

    /// Resolves the backend for `room` and asks it for a completion.
    async fn complete(&self, room: &Room) -> Result<Completion, OrchestratorError> {
        let key = room.backend_key(&self.settings.default_backend);
        let backend = self.components.backends.resolve(key)?;
        let model = room.effective_model(backend.as_ref());
        let system = room.effective_system_prompt(backend.as_ref());

        let history = self
            .components
            .context
            .fetch(&room.room_id)
            .await
            .map_err(OrchestratorError::Store)?;
        let context = self.settings.context_window.select(history);

        debug!(
            "Room {}: backend={}, model={}, turns={}",
            room.room_id,
            key,
            model,
            context.len()
        );

        let call = backend.create_chat_completion(&self.components.http, &context, system, model);
        let result = match self.settings.backend_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| OrchestratorError::BackendTimeout(limit))?,
            None => call.await,
        };
        let completion = result.map_err(OrchestratorError::Backend)?;

        if completion.content.trim().is_empty() {
            return Err(OrchestratorError::EmptyCompletion);
        }

        Ok(completion)
    }

    async fn send_error_reply(&self, room_id: &str, error: &OrchestratorError) {
        warn!("Backend failure in room {room_id}: {error}");
        if let Err(e) = self
            .components
            .transport
            .respond(room_id, ERROR_REPLY)
            .await
        {
            warn!("Failed to send error reply to room {room_id}: {e}");
        }
    }
}
