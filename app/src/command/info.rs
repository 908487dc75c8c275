use llmroom_config::Config;
use llmroom_core::Allowlist;
use llmroom_providers::{BackendKind, BasicOpenAiBackend};
use llmroom_store::SqlStore;
use std::path::PathBuf;
use tracing::info;

use super::load_config;

/// Strategy for displaying configuration information.
///
/// Credentials are masked. The database connection is tested.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = Option<PathBuf>;

    async fn execute(&self, config_path: Self::Input) -> anyhow::Result<()> {
        let config = load_config(config_path.as_deref())?;

        println!("=== llmroom Configuration ===\n");

        println!("Allowlist:");
        match &config.allowlist {
            Allowlist::Disabled => println!("  (disabled - all senders allowed)"),
            Allowlist::Only(senders) if senders.is_empty() => {
                println!("  (empty - nobody is answered)");
            }
            Allowlist::Only(senders) => {
                for sender in senders {
                    println!("  {sender}");
                }
            }
        }
        println!();

        println!("Backends (default: {}):", config.default_backend);
        for (key, backend) in &config.backends {
            let known = if BackendKind::parse(&backend.kind).is_some() {
                ""
            } else {
                " (unknown kind)"
            };
            println!("  {key}:");
            println!("    Kind: {}{known}", backend.kind);
            println!(
                "    Endpoint: {}",
                backend
                    .endpoint
                    .as_deref()
                    .unwrap_or(BasicOpenAiBackend::DEFAULT_ENDPOINT)
            );
            println!(
                "    Credential: {}",
                backend.credential.as_deref().map_or_else(|| "(not set)".to_string(), mask_secret)
            );
            println!("    Default Model: {}", backend.default_model);
            if !backend.default_system_prompt.is_empty() {
                println!(
                    "    Default System Prompt: {}",
                    truncate(&backend.default_system_prompt, 60)
                );
            }
        }
        if !config.backends.contains_key(&config.default_backend) {
            println!("  Warning: default backend is not configured");
        }
        println!();

        println!("Conversation:");
        println!("  Command Prefix: {}", config.conversation.command_prefix);
        println!("  Error Reply: {}", config.conversation.error_reply);
        if let Some(secs) = config.conversation.backend_timeout_secs {
            println!("  Backend Timeout: {secs}s");
        }
        match config.conversation.max_context_turns {
            Some(turns) if turns > 0 => println!("  Context: last {turns} turns"),
            _ => println!("  Context: full history"),
        }
        println!();

        println!("Database:");
        let db_url = config.database_url()?;
        println!("  URL: {}", mask_database_url(&db_url));

        info!("Testing database connection");
        match SqlStore::connect(&db_url).await {
            Ok(_) => println!("  Status: Connected"),
            Err(e) => {
                println!("  Status: Connection failed");
                println!("  Error: {e}");
            }
        }
        println!();

        println!("Telegram:");
        let token = if config.telegram.token.is_empty() {
            "(not set)".to_string()
        } else {
            mask_secret(&config.telegram.token)
        };
        println!("  Token: {token}");

        Ok(())
    }
}

fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > 8 {
        let prefix: String = secret.chars().take(4).collect();
        format!("{prefix}...***")
    } else {
        "***".to_string()
    }
}

fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let Some((credentials, after_at)) = rest.split_once('@') else {
        return url.to_string();
    };

    let Some((username, _password)) = credentials.split_once(':') else {
        return url.to_string();
    };

    format!("{scheme}://{username}:***@{after_at}")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
