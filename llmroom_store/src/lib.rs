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

//! SQL persistence for rooms and their conversation turns.

mod convert;

use async_trait::async_trait;
use chrono::Utc;
use llmroom_core::{ContextStore, Role, Room, RoomOverrides, RoomStore, Turn};
use llmroom_entities::{rooms, turns};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Schema,
    Set, SqlErr, TransactionTrait,
};
use tracing::{debug, info};

use crate::convert::{room_from_model, turn_from_model};

/// Attempts made by `append` when a concurrent writer claimed the same sequence.
const APPEND_ATTEMPTS: u32 = 5;

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Room and context store backed by any database sea-orm supports.
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to database: {}", database_url);

        let mut options = ConnectOptions::new(database_url.to_owned());
        options.sqlx_logging(false);
        // Every pooled connection to `sqlite::memory:` would open its own empty database.
        if database_url.contains(":memory:") {
            options.max_connections(1);
        }

        let db = Database::connect(options).await?;
        Self::from_connection(db).await
    }

    /// Wraps an existing connection, creating the tables if they are missing.
    pub async fn from_connection(db: DatabaseConnection) -> anyhow::Result<Self> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        for mut stmt in [
            schema.create_table_from_entity(rooms::Entity),
            schema.create_table_from_entity(turns::Entity),
        ] {
            stmt.if_not_exists();
            db.execute_unprepared(&backend.build(&stmt).to_string())
                .await?;
        }

        info!("SqlStore initialized");
        Ok(Self { db })
    }

    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn find_room(&self, room_id: &str) -> anyhow::Result<Option<Room>> {
        let model = rooms::Entity::find_by_id(room_id.to_owned())
            .one(&self.db)
            .await?;
        Ok(model.map(room_from_model))
    }

    async fn try_append(&self, room_id: &str, role: Role, content: &str) -> Result<Turn, DbErr> {
        let txn = self.db.begin().await?;

        let last = turns::Entity::find()
            .filter(turns::Column::RoomId.eq(room_id))
            .order_by_desc(turns::Column::Sequence)
            .one(&txn)
            .await?;
        let sequence = last.map_or(1, |t| t.sequence + 1);
        let now = Utc::now();

        turns::Entity::insert(turns::ActiveModel {
            room_id: Set(room_id.to_owned()),
            sequence: Set(sequence),
            role: Set(role.as_str().to_owned()),
            content: Set(content.to_owned()),
            created_at: Set(now.naive_utc()),
        })
        .exec_without_returning(&txn)
        .await?;

        txn.commit().await?;

        Ok(Turn {
            room_id: room_id.to_owned(),
            sequence,
            role,
            content: content.to_owned(),
            created_at: now,
        })
    }
}

#[async_trait]
impl RoomStore for SqlStore {
    async fn get_or_create(&self, room_id: &str) -> anyhow::Result<Room> {
        if let Some(room) = self.find_room(room_id).await? {
            return Ok(room);
        }

        let now = Utc::now().naive_utc();
        let inserted = rooms::Entity::insert(rooms::ActiveModel {
            room_id: Set(room_id.to_owned()),
            backend: Set(None),
            model: Set(None),
            system_prompt: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(rooms::Column::RoomId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        if inserted == 0 {
            debug!("Room {} was created concurrently, re-reading", room_id);
        } else {
            info!("Created room: {}", room_id);
        }

        self.find_room(room_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Room {room_id} missing right after creation"))
    }

    async fn update_overrides(
        &self,
        room_id: &str,
        overrides: &RoomOverrides,
    ) -> anyhow::Result<Room> {
        self.get_or_create(room_id).await?;

        let txn = self.db.begin().await?;
        let current = rooms::Entity::find_by_id(room_id.to_owned())
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Room {room_id} not found"))?;

        let updated = rooms::ActiveModel {
            room_id: Set(current.room_id),
            backend: Set(overrides.backend.apply(current.backend)),
            model: Set(overrides.model.apply(current.model)),
            system_prompt: Set(overrides.system_prompt.apply(current.system_prompt)),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        txn.commit().await?;

        info!("Updated overrides for room: {}", room_id);
        Ok(room_from_model(updated))
    }
}

#[async_trait]
impl ContextStore for SqlStore {
    async fn append(&self, room_id: &str, role: Role, content: &str) -> anyhow::Result<Turn> {
        let mut attempt = 1;
        loop {
            match self.try_append(room_id, role, content).await {
                Ok(turn) => {
                    debug!(
                        "Appended {} turn #{} to room {}",
                        turn.role, turn.sequence, room_id
                    );
                    return Ok(turn);
                }
                Err(e) if attempt < APPEND_ATTEMPTS && is_unique_violation(&e) => {
                    debug!(
                        "Sequence conflict in room {} (attempt {attempt}/{APPEND_ATTEMPTS}), retrying",
                        room_id
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn fetch(&self, room_id: &str) -> anyhow::Result<Vec<Turn>> {
        turns::Entity::find()
            .filter(turns::Column::RoomId.eq(room_id))
            .order_by_asc(turns::Column::Sequence)
            .all(&self.db)
            .await?
            .into_iter()
            .map(turn_from_model)
            .collect()
    }

    async fn count(&self, room_id: &str) -> anyhow::Result<u64> {
        let count = turns::Entity::find()
            .filter(turns::Column::RoomId.eq(room_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}
