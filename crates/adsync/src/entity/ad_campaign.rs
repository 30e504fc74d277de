//! AdCampaign entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ad_campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local id of the parent ad account.
    pub ad_account_id: Uuid,
    #[sea_orm(unique)]
    pub external_id: String,

    pub name: String,
    pub status: String,
    pub objective: Option<String>,

    pub synced_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ad_account::Entity",
        from = "Column::AdAccountId",
        to = "super::ad_account::Column::Id",
        on_delete = "Cascade"
    )]
    AdAccount,
    #[sea_orm(has_many = "super::ad_set::Entity")]
    AdSets,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccount.def()
    }
}

impl Related<super::ad_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdSets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
