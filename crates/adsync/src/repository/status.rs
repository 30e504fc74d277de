use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, sea_query::Expr};

use crate::entity::sync_type::SyncType;
use crate::entity::{ad, ad_campaign, ad_set};

use super::errors::{RepositoryError, Result};

/// Set the stored status of one campaign, ad set or ad by external id.
///
/// Returns the number of rows changed (0 when the row is not stored locally).
pub async fn set_status(
    db: &DatabaseConnection,
    sync_type: SyncType,
    external_id: &str,
    status: &str,
) -> Result<u64> {
    let now = Utc::now().fixed_offset();
    let result = match sync_type {
        SyncType::Campaigns => {
            ad_campaign::Entity::update_many()
                .col_expr(ad_campaign::Column::Status, Expr::value(status))
                .col_expr(ad_campaign::Column::UpdatedAt, Expr::value(now))
                .filter(ad_campaign::Column::ExternalId.eq(external_id))
                .exec(db)
                .await?
        }
        SyncType::AdSets => {
            ad_set::Entity::update_many()
                .col_expr(ad_set::Column::Status, Expr::value(status))
                .col_expr(ad_set::Column::UpdatedAt, Expr::value(now))
                .filter(ad_set::Column::ExternalId.eq(external_id))
                .exec(db)
                .await?
        }
        SyncType::Ads => {
            ad::Entity::update_many()
                .col_expr(ad::Column::Status, Expr::value(status))
                .col_expr(ad::Column::UpdatedAt, Expr::value(now))
                .filter(ad::Column::ExternalId.eq(external_id))
                .exec(db)
                .await?
        }
        SyncType::AdAccounts => {
            return Err(RepositoryError::invalid_input(
                "ad accounts have no writable status",
            ));
        }
    };
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    #[tokio::test]
    async fn set_status_reports_rows_changed() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 1,
                last_insert_id: 0,
            }])
            .into_connection();

        let changed = set_status(&db, SyncType::Ads, "238", "PAUSED")
            .await
            .expect("update");
        assert_eq!(changed, 1);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("UPDATE") && log.contains("PAUSED"));
    }

    #[tokio::test]
    async fn accounts_have_no_status() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let err = set_status(&db, SyncType::AdAccounts, "act_1", "PAUSED")
            .await
            .expect_err("accounts rejected");
        assert!(matches!(err, RepositoryError::InvalidInput { .. }));
    }
}
