use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entity::connection::{
    ActiveModel, Column, Entity as Connection, Model, decode_last_synced, encode_last_synced,
};
use crate::entity::sync_type::SyncType;

use super::errors::{RepositoryError, Result};

const ENTITY: &str = "Connection";

/// Input for creating a connection.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub label: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Credentials produced by a successful token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
}

/// Insert a new connection with an empty sync history.
pub async fn create(db: &DatabaseConnection, input: NewConnection) -> Result<Model> {
    if input.user_id.trim().is_empty() {
        return Err(RepositoryError::invalid_input("user_id must not be empty"));
    }

    let now = Utc::now().fixed_offset();
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(input.user_id),
        label: Set(input.label),
        access_token: Set(input.access_token),
        refresh_token: Set(input.refresh_token),
        token_expires_at: Set(input.token_expires_at.map(|t| t.fixed_offset())),
        token_renewed_at: Set(None),
        last_synced: Set(serde_json::json!({})),
        created_at: Set(now),
        updated_at: Set(now),
    };

    Ok(model.insert(db).await?)
}

pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Model>> {
    Ok(Connection::find_by_id(id).one(db).await?)
}

/// Like [`find_by_id`], but a missing row is an error.
pub async fn get(db: &DatabaseConnection, id: Uuid) -> Result<Model> {
    find_by_id(db, id)
        .await?
        .ok_or_else(|| RepositoryError::not_found_by_id(ENTITY, id))
}

/// All connections, oldest first.
pub async fn list(db: &DatabaseConnection) -> Result<Vec<Model>> {
    Ok(Connection::find()
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn list_for_user(db: &DatabaseConnection, user_id: &str) -> Result<Vec<Model>> {
    Ok(Connection::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

/// Connections whose token expires at or before `deadline`.
pub async fn find_expiring(db: &DatabaseConnection, deadline: DateTime<Utc>) -> Result<Vec<Model>> {
    Ok(Connection::find()
        .filter(Column::TokenExpiresAt.is_not_null())
        .filter(Column::TokenExpiresAt.lte(deadline.fixed_offset()))
        .order_by_asc(Column::TokenExpiresAt)
        .all(db)
        .await?)
}

/// Store renewed credentials in one transaction.
///
/// Expiry is never set earlier than the previous renewal time, and the
/// renewal time never moves backwards.
pub async fn update_tokens(db: &DatabaseConnection, id: Uuid, update: &TokenUpdate) -> Result<Model> {
    let txn = db.begin().await?;

    let current = Connection::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| RepositoryError::not_found_by_id(ENTITY, id))?;

    let previous_renewal = current.token_renewed_at.map(|t| t.with_timezone(&Utc));
    let renewed_at = previous_renewal.map_or(update.renewed_at, |prev| prev.max(update.renewed_at));
    let expires_at = previous_renewal.map_or(update.expires_at, |prev| prev.max(update.expires_at));

    let mut model: ActiveModel = current.into();
    model.access_token = Set(update.access_token.clone());
    model.token_expires_at = Set(Some(expires_at.fixed_offset()));
    model.token_renewed_at = Set(Some(renewed_at.fixed_offset()));
    model.updated_at = Set(Utc::now().fixed_offset());
    let updated = model.update(&txn).await?;

    txn.commit().await?;
    Ok(updated)
}

/// Advance `last_synced[sync_type]` to `at` unless it is already later.
///
/// Returns the stored timestamp after the call.
pub async fn advance_last_synced(
    db: &DatabaseConnection,
    id: Uuid,
    sync_type: SyncType,
    at: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let txn = db.begin().await?;

    let current = Connection::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| RepositoryError::not_found_by_id(ENTITY, id))?;

    let mut map = decode_last_synced(&current.last_synced);
    if let Some(existing) = map.get(&sync_type).copied()
        && existing >= at
    {
        txn.commit().await?;
        return Ok(existing);
    }

    map.insert(sync_type, at);
    let mut model: ActiveModel = current.into();
    model.last_synced = Set(encode_last_synced(&map));
    model.updated_at = Set(Utc::now().fixed_offset());
    model.update(&txn).await?;

    txn.commit().await?;
    Ok(at)
}
