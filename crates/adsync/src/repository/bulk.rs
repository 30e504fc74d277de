use std::time::Duration;

use backon::Retryable;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    sea_query::OnConflict,
};

use crate::entity::{ad, ad_account, ad_campaign, ad_set};
use crate::retry::RetryConfig;

use super::errors::{RepositoryError, Result};

/// Retry attempts for transient database errors during bulk upserts.
pub const DEFAULT_BULK_UPSERT_RETRIES: usize = 3;

/// Initial backoff for bulk upsert retries.
pub const DEFAULT_BULK_UPSERT_BACKOFF: Duration = Duration::from_millis(100);

// ─── Conflict clauses ────────────────────────────────────────────────────────
//
// Each clause targets the unique external_id and updates mutable fields only.
// The local id, external_id, parent linkage and created_at never change.

pub(crate) fn ad_account_on_conflict() -> OnConflict {
    use ad_account::Column;
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::Name,
            Column::Currency,
            Column::AccountStatus,
            Column::BusinessId,
            Column::TimezoneName,
            Column::TimezoneOffsetMinutes,
            Column::Permissions,
            Column::SyncedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

pub(crate) fn ad_campaign_on_conflict() -> OnConflict {
    use ad_campaign::Column;
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::Name,
            Column::Status,
            Column::Objective,
            Column::SyncedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

pub(crate) fn ad_set_on_conflict() -> OnConflict {
    use ad_set::Column;
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::Name,
            Column::Status,
            Column::SyncedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

pub(crate) fn ad_on_conflict() -> OnConflict {
    use ad::Column;
    OnConflict::column(Column::ExternalId)
        .update_columns([
            Column::Name,
            Column::Status,
            Column::SyncedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

// ─── Bulk upserts ────────────────────────────────────────────────────────────

/// Upsert ad accounts keyed on `external_id`.
pub async fn upsert_ad_accounts(
    db: &DatabaseConnection,
    models: Vec<ad_account::ActiveModel>,
) -> Result<u64> {
    upsert_with_retry(db, models, ad_account_on_conflict()).await
}

/// Upsert campaigns keyed on `external_id`.
pub async fn upsert_ad_campaigns(
    db: &DatabaseConnection,
    models: Vec<ad_campaign::ActiveModel>,
) -> Result<u64> {
    upsert_with_retry(db, models, ad_campaign_on_conflict()).await
}

/// Single `INSERT ... ON CONFLICT DO UPDATE`, retried on transient errors.
///
/// Returns the number of rows inserted or updated.
pub(crate) async fn upsert_with_retry<A>(
    db: &DatabaseConnection,
    models: Vec<A>,
    on_conflict: OnConflict,
) -> Result<u64>
where
    A: ActiveModelTrait + Clone + Send + Sync,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    if models.is_empty() {
        return Ok(0);
    }

    tracing::debug!(count = models.len(), "Starting bulk upsert");

    let backoff = RetryConfig::new(
        DEFAULT_BULK_UPSERT_BACKOFF,
        DEFAULT_BULK_UPSERT_BACKOFF * 20,
        DEFAULT_BULK_UPSERT_RETRIES,
    )
    .with_jitter(false)
    .into_backoff();

    (|| async {
        <A::Entity as EntityTrait>::insert_many(models.clone())
            .on_conflict(on_conflict.clone())
            .exec_without_returning(db)
            .await
    })
    .retry(backoff)
    .when(is_retryable_db_error)
    .notify(|err, dur| {
        tracing::warn!(
            backoff_ms = dur.as_millis() as u64,
            error = %err,
            "Bulk upsert failed, retrying..."
        );
    })
    .await
    .map_err(RepositoryError::from)
}

/// Whether a database error is transient (locked, busy, connection trouble).
pub(crate) fn is_retryable_db_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let err_str = err.to_string().to_lowercase();
            err_str.contains("locked")
                || err_str.contains("busy")
                || err_str.contains("timeout")
                || err_str.contains("connection")
                || err_str.contains("temporarily unavailable")
        }
        _ => false,
    }
}
