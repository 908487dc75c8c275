use llmroom_core::Allowlist;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_DIR_NAME: &str = "llmroom";
const CONFIG_FILE_NAME: &str = "config.json";

/// Static configuration, loaded once at startup and never mutated afterwards.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub allowlist: Allowlist,
    pub default_backend: String,
    pub backends: BTreeMap<String, BackendConfig>,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend type, e.g. `basic_openai`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    pub default_model: String,
    #[serde(default)]
    pub default_system_prompt: String,
    /// HTTP request timeout for this backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Delays between attempts; empty means a single attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_delays_secs: Vec<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    #[serde(default = "ConversationConfig::default_command_prefix")]
    pub command_prefix: String,
    /// Send a visible message to the room when the backend call fails.
    #[serde(default = "ConversationConfig::default_error_reply")]
    pub error_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_timeout_secs: Option<u64>,
    /// Newest turns sent to the backend; unset sends the whole history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_turns: Option<usize>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            command_prefix: Self::default_command_prefix(),
            error_reply: Self::default_error_reply(),
            backend_timeout_secs: None,
            max_context_turns: None,
        }
    }
}

impl ConversationConfig {
    fn default_command_prefix() -> String {
        "!".to_string()
    }

    const fn default_error_reply() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Defaults to a SQLite file next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
}

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join(CONFIG_DIR_NAME))
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'llmroom init' to create config.",
                config_path.display()
            );
        }

        let content = std::fs::read_to_string(config_path)?;
        let config = Self::from_json(&content)?;
        info!("Loaded config from {}", config_path.display());

        Ok(config)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// An unknown default backend only warns: it surfaces once a room needs it.
    fn validate(&self) -> anyhow::Result<()> {
        if self.conversation.command_prefix.is_empty() {
            anyhow::bail!(
                "conversation.command_prefix must not be empty, every message would be a command"
            );
        }
        if !self.backends.contains_key(&self.default_backend) {
            warn!(
                "default_backend `{}` is not one of the configured backends",
                self.default_backend
            );
        }
        Ok(())
    }

    /// Database URL, falling back to `~/llmroom/llmroom.db`.
    pub fn database_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.database.url {
            return Ok(url.clone());
        }
        let path = Self::config_dir()?.join("llmroom.db");
        Ok(format!("sqlite://{}?mode=rwc", path.display()))
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Next steps:");
        println!("   1. Add your provider credential under backends.openai.credential");
        println!("   2. List permitted sender ids in allowlist (or set it to false)");
        println!("   3. Run 'llmroom console' to try it locally, or set telegram.token");
        println!("      and run 'llmroom telegram'");
        println!();
        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"{
  "allowlist": [],
  "default_backend": "openai",
  "backends": {
    "openai": {
      "kind": "basic_openai",
      "endpoint": "https://api.openai.com/v1",
      "credential": "your-api-key-here",
      "default_model": "gpt-4o-mini",
      "default_system_prompt": "You are a helpful assistant in a group chat. Keep answers short."
    }
  },
  "conversation": {
    "command_prefix": "!",
    "error_reply": true,
    "backend_timeout_secs": 120
  },
  "telegram": {
    "token": ""
  }
}"#;
