//! Static strategy pattern for CLI commands.
//!
//! Each subcommand is a separate strategy type with its own input, dispatched
//! statically from `main`.

use llmroom_config::Config;
use llmroom_conversation::{Components, OrchestratorSettings, RoomService};
use llmroom_core::ChatTransport;
use llmroom_providers::BackendRegistry;
use llmroom_store::SqlStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

mod console;
mod info;
mod init;
mod telegram;
mod version;

pub use console::{ConsoleInput, ConsoleStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use telegram::{TelegramInput, TelegramStrategy};
pub use version::VersionStrategy;

/// Contract for all command strategies.
///
/// Each strategy defines its own input type, so parameters are passed
/// without runtime casting or boxing.
pub trait CommandStrategy: Send + Sync + 'static {
    type Input;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Loaded configuration plus the collaborators every transport shares.
pub struct CommonComponents {
    pub config: Config,
    pub store: Arc<SqlStore>,
    pub backends: Arc<BackendRegistry>,
    pub http: reqwest::Client,
}

impl CommonComponents {
    /// Wires the room service to `transport`.
    pub fn into_service(self, transport: Arc<dyn ChatTransport>) -> RoomService {
        let settings = OrchestratorSettings::from_config(&self.config);
        let components = Components {
            rooms: self.store.clone(),
            context: self.store,
            backends: self.backends,
            transport,
            http: self.http,
        };
        RoomService::new(components, settings)
    }
}

pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Load config, open the database and construct the configured backends.
pub async fn init_common_components(
    config_path: Option<&Path>,
) -> anyhow::Result<CommonComponents> {
    let config = load_config(config_path)?;

    let backends = Arc::new(BackendRegistry::from_config(&config.backends)?);
    info!("Backends: {}", backends.keys().join(", "));

    let store = Arc::new(connect_store_with_retry(&config.database_url()?).await?);

    Ok(CommonComponents {
        config,
        store,
        backends,
        http: reqwest::Client::new(),
    })
}

/// Connect to the database with exponential backoff retry.
///
/// Delays go 1s, 2s, then stay at 3s; retries until connection succeeds.
async fn connect_store_with_retry(database_url: &str) -> anyhow::Result<SqlStore> {
    const MAX_DELAY: Duration = Duration::from_secs(3);
    const INITIAL_DELAY: Duration = Duration::from_secs(1);

    let mut attempt = 0u32;
    let mut delay = INITIAL_DELAY;

    loop {
        attempt += 1;
        match SqlStore::connect(database_url).await {
            Ok(store) => {
                info!("Database connected on attempt {attempt}");
                return Ok(store);
            }
            Err(e) => {
                warn!(
                    "Failed to connect to database (attempt {attempt}): {e}. Retrying in {}s...",
                    delay.as_secs()
                );
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
