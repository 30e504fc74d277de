use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};

use crate::entity::kv_entry::{ActiveModel, Column, Entity as KvEntry};

use super::{KeyValueStore, Result};

/// Key-value store backed by the `kv_entries` table.
///
/// Writes are single `INSERT ... ON CONFLICT DO UPDATE` statements, so
/// concurrent writers from separate processes never interleave.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for DatabaseStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = KvEntry::find_by_id(key.to_string()).one(self.db.as_ref()).await? else {
            return Ok(None);
        };

        let now = Utc::now().fixed_offset();
        if entry.expires_at.is_some_and(|at| at <= now) {
            KvEntry::delete_by_id(key.to_string())
                .exec(self.db.as_ref())
                .await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| (now + ttl).fixed_offset());

        let model = ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expires_at),
            updated_at: Set(now.fixed_offset()),
        };

        KvEntry::insert(model)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .update_columns([Column::Value, Column::ExpiresAt, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| (now + ttl).fixed_offset());

        // An expired row still holds the key, so clear it before claiming.
        KvEntry::delete_many()
            .filter(Column::Key.eq(key))
            .filter(Column::ExpiresAt.lte(now.fixed_offset()))
            .exec(self.db.as_ref())
            .await?;

        let model = ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expires_at),
            updated_at: Set(now.fixed_offset()),
        };

        let inserted = KvEntry::insert(model)
            .on_conflict(OnConflict::column(Column::Key).do_nothing().to_owned())
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(inserted == 1)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        KvEntry::delete_by_id(key.to_string())
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// Delete every expired entry. Returns the number of rows removed.
pub async fn purge_expired(db: &DatabaseConnection) -> Result<u64> {
    let now = Utc::now().fixed_offset();
    let result = KvEntry::delete_many()
        .filter(Column::ExpiresAt.lte(now))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        tracing::debug!(removed = result.rows_affected, "Purged expired kv entries");
    }
    Ok(result.rows_affected)
}
