//! AdSet entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ad_sets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local id of the parent campaign.
    pub ad_campaign_id: Uuid,
    #[sea_orm(unique)]
    pub external_id: String,

    pub name: String,
    pub status: String,

    pub synced_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ad_campaign::Entity",
        from = "Column::AdCampaignId",
        to = "super::ad_campaign::Column::Id",
        on_delete = "Cascade"
    )]
    AdCampaign,
    #[sea_orm(has_many = "super::ad::Entity")]
    Ads,
}

impl Related<super::ad_campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdCampaign.def()
    }
}

impl Related<super::ad::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
