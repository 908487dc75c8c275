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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod allowlist;
mod error;

pub use allowlist::Allowlist;
pub use error::ConfigurationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => anyhow::bail!("Unknown role: {other}"),
        }
    }
}

/// One entry of a room's conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub room_id: String,
    /// Position within the room, starting at 1.
    pub sequence: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted per-room state with optional overrides of the backend defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub room_id: String,
    pub backend: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Backend key for this room: the override, else `default_key`.
    #[must_use]
    pub fn backend_key<'a>(&'a self, default_key: &'a str) -> &'a str {
        self.backend.as_deref().unwrap_or(default_key)
    }

    /// An empty model override counts as unset.
    #[must_use]
    pub fn effective_model<'a>(&'a self, backend: &'a dyn Backend) -> &'a str {
        self.model
            .as_deref()
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| backend.default_model())
    }

    /// An empty prompt override counts as unset.
    #[must_use]
    pub fn effective_system_prompt<'a>(&'a self, backend: &'a dyn Backend) -> &'a str {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or_else(|| backend.default_system_prompt())
    }
}

/// A single field change requested by an administrative action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverrideChange {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl OverrideChange {
    #[must_use]
    pub fn apply(&self, current: Option<String>) -> Option<String> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(value) => Some(value.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomOverrides {
    pub backend: OverrideChange,
    pub model: OverrideChange,
    pub system_prompt: OverrideChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A backend's reply to one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub role: Role,
    pub content: String,
    pub usage: Option<Usage>,
}

impl Completion {
    #[must_use]
    pub const fn assistant(content: String) -> Self {
        Self {
            role: Role::Assistant,
            content,
            usage: None,
        }
    }
}

/// A message event delivered by a chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub room_id: String,
    pub body: String,
}

impl InboundMessage {
    pub fn new(
        sender: impl Into<String>,
        room_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            room_id: room_id.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Returns the room, creating it with every override unset on first sight.
    async fn get_or_create(&self, room_id: &str) -> anyhow::Result<Room>;

    async fn update_overrides(
        &self,
        room_id: &str,
        overrides: &RoomOverrides,
    ) -> anyhow::Result<Room>;
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Appends a turn after the current last turn of the room.
    async fn append(&self, room_id: &str, role: Role, content: &str) -> anyhow::Result<Turn>;

    /// Full history of the room, oldest first.
    async fn fetch(&self, room_id: &str) -> anyhow::Result<Vec<Turn>>;

    async fn count(&self, room_id: &str) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn default_model(&self) -> &str;

    fn default_system_prompt(&self) -> &str;

    async fn create_chat_completion(
        &self,
        http: &reqwest::Client,
        context: &[Turn],
        system: &str,
        model: &str,
    ) -> anyhow::Result<Completion>;
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn mark_read(&self, message: &InboundMessage) -> anyhow::Result<()>;

    async fn respond(&self, room_id: &str, text: &str) -> anyhow::Result<()>;
}
