//! Per-owner sync cursor, kept apart from task data.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::OwnerId;
use crate::store::StoreError;

/// Seconds from the Unix epoch back to 0001-01-01T00:00:00Z.
const EPOCH_MINIMUM_SECS: i64 = -62_135_596_800;

pub struct SyncCursor;

impl SyncCursor {
    /// Cursor value before the first successful pass.
    pub fn epoch_minimum() -> DateTime<Utc> {
        DateTime::from_timestamp(EPOCH_MINIMUM_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, owner: OwnerId) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn set(&self, owner: OwnerId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Logout/reset. The only way a cursor ever goes back.
    async fn clear(&self, owner: OwnerId) -> Result<(), StoreError>;
}

/// Cursor table in a small sqlite preferences database.
#[derive(Clone)]
pub struct SqliteCursorStore {
    db: SqlitePool,
}

impl SqliteCursorStore {
    pub async fn new(db: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                owner_id INTEGER PRIMARY KEY NOT NULL,
                last_sync_us INTEGER NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db })
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, owner: OwnerId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let us: Option<i64> =
            sqlx::query_scalar("SELECT last_sync_us FROM sync_cursors WHERE owner_id = ?")
                .bind(owner.get())
                .fetch_optional(&self.db)
                .await?;

        us.map(|us| {
            DateTime::from_timestamp_micros(us).ok_or_else(|| {
                StoreError::Corrupt(format!("cursor for owner {} out of range", owner))
            })
        })
        .transpose()
    }

    async fn set(&self, owner: OwnerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (owner_id, last_sync_us)
            VALUES (?1, ?2)
            ON CONFLICT(owner_id) DO UPDATE SET last_sync_us = excluded.last_sync_us
            "#,
        )
        .bind(owner.get())
        .bind(at.timestamp_micros())
        .execute(&self.db)
        .await?;

        debug!("cursor for owner {} set to {}", owner, at.to_rfc3339());
        Ok(())
    }

    async fn clear(&self, owner: OwnerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_cursors WHERE owner_id = ?")
            .bind(owner.get())
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<OwnerId, DateTime<Utc>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, owner: OwnerId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.cursors.read().await.get(&owner).copied())
    }

    async fn set(&self, owner: OwnerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.cursors.write().await.insert(owner, at);
        Ok(())
    }

    async fn clear(&self, owner: OwnerId) -> Result<(), StoreError> {
        self.cursors.write().await.remove(&owner);
        Ok(())
    }
}
