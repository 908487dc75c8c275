#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;

use clap::{Parser, Subcommand};
use command::{
    CommandStrategy, ConsoleInput, ConsoleStrategy, InfoStrategy, InitStrategy, TelegramInput,
    TelegramStrategy, VersionStrategy,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "llmroom")]
#[command(about = "LLM assistant for chat rooms", long_about = None)]
struct Cli {
    /// Config file (default: ~/llmroom/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve Telegram chats
    Telegram {
        /// Bot token (overrides config)
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Chat in a local room from the terminal
    Console {
        /// Room to talk in
        #[arg(short, long, default_value = "console")]
        room: String,

        /// Sender id checked against the allowlist
        #[arg(short, long, default_value = "local")]
        sender: String,

        /// Single message to send
        #[arg(short = 'm', long)]
        message: Option<String>,
    },
    /// Show configuration
    Info,
    /// Initialize configuration
    Init,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command {
        Commands::Telegram { token } => {
            TelegramStrategy
                .execute(TelegramInput { config_path, token })
                .await
        }
        Commands::Console {
            room,
            sender,
            message,
        } => {
            ConsoleStrategy
                .execute(ConsoleInput {
                    config_path,
                    room,
                    sender,
                    message,
                })
                .await
        }
        Commands::Info => InfoStrategy.execute(config_path).await,
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}
