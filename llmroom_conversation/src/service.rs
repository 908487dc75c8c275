use llmroom_core::InboundMessage;
use tracing::debug;

use crate::command::RoomCommands;
use crate::orchestrator::{
    Components, IgnoreReason, Orchestrator, OrchestratorError, OrchestratorSettings, Outcome,
};

/// Entry point for transports: chat messages go to the orchestrator,
/// commands from authorized senders go to the command handler.
pub struct RoomService {
    orchestrator: Orchestrator,
    commands: RoomCommands,
}

impl RoomService {
    #[must_use]
    pub fn new(components: Components, settings: OrchestratorSettings) -> Self {
        let commands = RoomCommands::new(components.clone(), &settings);
        Self {
            orchestrator: Orchestrator::new(components, settings),
            commands,
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn on_message(&self, message: &InboundMessage) -> Result<Outcome, OrchestratorError> {
        let outcome = self.orchestrator.handle(message).await?;

        if outcome == Outcome::Ignored(IgnoreReason::Command) {
            debug!("Dispatching command from {}", message.sender);
            self.commands.handle(message).await?;
        }

        Ok(outcome)
    }
}
