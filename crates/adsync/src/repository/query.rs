use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::entity::sync_type::SyncType;
use crate::entity::{ad, ad_account, ad_campaign, ad_set};

use super::errors::Result;

/// A locally stored parent, as needed to walk its children upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
}

impl From<ad_account::Model> for ParentRef {
    fn from(m: ad_account::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            name: m.name,
        }
    }
}

impl From<ad_campaign::Model> for ParentRef {
    fn from(m: ad_campaign::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            name: m.name,
        }
    }
}

impl From<ad_set::Model> for ParentRef {
    fn from(m: ad_set::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            name: m.name,
        }
    }
}

fn ids(refs: &[ParentRef]) -> Vec<Uuid> {
    refs.iter().map(|r| r.id).collect()
}

/// Ad accounts of a connection, ordered by external id.
pub async fn account_refs(db: &DatabaseConnection, connection_id: Uuid) -> Result<Vec<ParentRef>> {
    let accounts = ad_account::Entity::find()
        .filter(ad_account::Column::ConnectionId.eq(connection_id))
        .order_by_asc(ad_account::Column::ExternalId)
        .all(db)
        .await?;
    Ok(accounts.into_iter().map(ParentRef::from).collect())
}

/// Campaigns under the given local account ids.
pub async fn campaign_refs(db: &DatabaseConnection, account_ids: &[Uuid]) -> Result<Vec<ParentRef>> {
    if account_ids.is_empty() {
        return Ok(Vec::new());
    }
    let campaigns = ad_campaign::Entity::find()
        .filter(ad_campaign::Column::AdAccountId.is_in(account_ids.iter().copied()))
        .order_by_asc(ad_campaign::Column::ExternalId)
        .all(db)
        .await?;
    Ok(campaigns.into_iter().map(ParentRef::from).collect())
}

/// Ad sets under the given local campaign ids.
pub async fn ad_set_refs(db: &DatabaseConnection, campaign_ids: &[Uuid]) -> Result<Vec<ParentRef>> {
    if campaign_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ad_sets = ad_set::Entity::find()
        .filter(ad_set::Column::AdCampaignId.is_in(campaign_ids.iter().copied()))
        .order_by_asc(ad_set::Column::ExternalId)
        .all(db)
        .await?;
    Ok(ad_sets.into_iter().map(ParentRef::from).collect())
}

/// Parents whose children a stage of `sync_type` fetches.
///
/// Accounts have no parent rows and return an empty list.
pub async fn parent_refs(
    db: &DatabaseConnection,
    connection_id: Uuid,
    sync_type: SyncType,
) -> Result<Vec<ParentRef>> {
    match sync_type {
        SyncType::AdAccounts => Ok(Vec::new()),
        SyncType::Campaigns => account_refs(db, connection_id).await,
        SyncType::AdSets => {
            let accounts = account_refs(db, connection_id).await?;
            campaign_refs(db, &ids(&accounts)).await
        }
        SyncType::Ads => {
            let accounts = account_refs(db, connection_id).await?;
            let campaigns = campaign_refs(db, &ids(&accounts)).await?;
            ad_set_refs(db, &ids(&campaigns)).await
        }
    }
}

/// Number of stored rows per level for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HierarchyCounts {
    pub ad_accounts: u64,
    pub campaigns: u64,
    pub ad_sets: u64,
    pub ads: u64,
}

impl HierarchyCounts {
    pub fn get(&self, sync_type: SyncType) -> u64 {
        match sync_type {
            SyncType::AdAccounts => self.ad_accounts,
            SyncType::Campaigns => self.campaigns,
            SyncType::AdSets => self.ad_sets,
            SyncType::Ads => self.ads,
        }
    }
}

/// Count stored hierarchy rows for a connection.
pub async fn hierarchy_counts(
    db: &DatabaseConnection,
    connection_id: Uuid,
) -> Result<HierarchyCounts> {
    let accounts = account_refs(db, connection_id).await?;
    let campaigns = campaign_refs(db, &ids(&accounts)).await?;
    let ad_sets = ad_set_refs(db, &ids(&campaigns)).await?;

    let ads = if ad_sets.is_empty() {
        0
    } else {
        ad::Entity::find()
            .filter(ad::Column::AdSetId.is_in(ids(&ad_sets)))
            .count(db)
            .await?
    };

    Ok(HierarchyCounts {
        ad_accounts: accounts.len() as u64,
        campaigns: campaigns.len() as u64,
        ad_sets: ad_sets.len() as u64,
        ads,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    use super::*;

    fn account(external_id: &str, connection_id: Uuid) -> ad_account::Model {
        let now = Utc::now().fixed_offset();
        ad_account::Model {
            id: Uuid::new_v4(),
            connection_id,
            external_id: external_id.to_string(),
            name: format!("Account {external_id}"),
            currency: Some("USD".to_string()),
            account_status: Some(1),
            business_id: None,
            timezone_name: None,
            timezone_offset_minutes: None,
            permissions: serde_json::json!([]),
            synced_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn account_refs_map_to_plain_values() {
        let connection_id = Uuid::new_v4();
        let a = account("act_1", connection_id);
        let b = account("act_2", connection_id);
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![a.clone(), b.clone()]])
            .into_connection();

        let refs = account_refs(&db, connection_id).await.expect("refs");
        assert_eq!(
            refs,
            vec![
                ParentRef {
                    id: a.id,
                    external_id: "act_1".to_string(),
                    name: "Account act_1".to_string()
                },
                ParentRef {
                    id: b.id,
                    external_id: "act_2".to_string(),
                    name: "Account act_2".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_id_lists_skip_queries() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        assert!(campaign_refs(&db, &[]).await.expect("refs").is_empty());
        assert!(ad_set_refs(&db, &[]).await.expect("refs").is_empty());
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn accounts_stage_has_no_parents() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let refs = parent_refs(&db, Uuid::new_v4(), SyncType::AdAccounts)
            .await
            .expect("refs");
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn ads_parents_stop_early_without_accounts() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<ad_account::Model>::new()])
            .into_connection();
        let refs = parent_refs(&db, Uuid::new_v4(), SyncType::Ads)
            .await
            .expect("refs");
        assert!(refs.is_empty());
        assert_eq!(db.into_transaction_log().len(), 1);
    }
}
