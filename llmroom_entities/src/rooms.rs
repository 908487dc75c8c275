use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per chat room, holding the room's optional overrides.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rooms")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub room_id: String,
    pub backend: Option<String>,
    pub model: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub system_prompt: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
