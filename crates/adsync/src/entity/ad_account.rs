//! AdAccount entity - an advertising account visible through a connection.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// AdAccount model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ad_accounts")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning connection.
    pub connection_id: Uuid,
    /// Upstream identifier (e.g. `act_1234`). Idempotency key for upserts.
    #[sea_orm(unique)]
    pub external_id: String,

    pub name: String,
    /// ISO 4217 currency code.
    pub currency: Option<String>,
    /// Numeric upstream account status code.
    pub account_status: Option<i32>,
    pub business_id: Option<String>,
    pub timezone_name: Option<String>,
    /// Timezone offset from UTC in minutes.
    pub timezone_offset_minutes: Option<i32>,
    /// Tasks the connection's user may perform on this account (JSON array).
    #[sea_orm(column_type = "Json")]
    pub permissions: serde_json::Value,

    pub synced_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id",
        on_delete = "Cascade"
    )]
    Connection,
    #[sea_orm(has_many = "super::ad_campaign::Entity")]
    AdCampaigns,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl Related<super::ad_campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdCampaigns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
