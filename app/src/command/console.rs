//! Terminal chat against a single room, for trying a configuration locally.

use async_trait::async_trait;
use llmroom_conversation::{IgnoreReason, Outcome, RoomService};
use llmroom_core::{ChatTransport, Completion, InboundMessage};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{CommandStrategy, init_common_components};

/// Prints replies to stdout.
struct ConsoleTransport;

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn mark_read(&self, message: &InboundMessage) -> anyhow::Result<()> {
        debug!("Read receipt for {} in {}", message.sender, message.room_id);
        Ok(())
    }

    async fn respond(&self, _room_id: &str, text: &str) -> anyhow::Result<()> {
        println!("\n{text}\n");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleInput {
    pub config_path: Option<PathBuf>,
    pub room: String,
    pub sender: String,
    /// Single message to send (non-interactive mode)
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsoleStrategy;

impl CommandStrategy for ConsoleStrategy {
    type Input = ConsoleInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let common = init_common_components(input.config_path.as_deref()).await?;
        let service = common.into_service(Arc::new(ConsoleTransport));

        if let Some(body) = input.message {
            let message = InboundMessage::new(&input.sender, &input.room, body);
            send(&service, &message).await?;
            return Ok(());
        }

        println!("=== Room: {} (as {}) ===", input.room, input.sender);
        println!("Type 'exit', 'quit', or Ctrl+C to end the session.\n");

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();

            if matches!(line, "exit" | "quit" | "q") {
                break;
            }
            if line.is_empty() {
                continue;
            }

            let message = InboundMessage::new(&input.sender, &input.room, line);
            if let Err(e) = send(&service, &message).await {
                eprintln!("Error: {e}");
            }
        }

        Ok(())
    }
}

async fn send(service: &RoomService, message: &InboundMessage) -> anyhow::Result<()> {
    match service.on_message(message).await? {
        Outcome::Ignored(IgnoreReason::Unauthorized) => {
            eprintln!(
                "Sender `{}` is not in the allowlist; message ignored.",
                message.sender
            );
        }
        Outcome::Replied(Completion {
            usage: Some(usage), ..
        }) => {
            debug!(
                "Tokens: {} prompt + {} completion = {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        _ => {}
    }
    Ok(())
}
