mod schema;

pub use schema::{BackendConfig, Config, ConversationConfig, DatabaseConfig, TelegramConfig};
