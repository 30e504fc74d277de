//! Ad entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local id of the parent ad set.
    pub ad_set_id: Uuid,
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
        belongs_to = "super::ad_set::Entity",
        from = "Column::AdSetId",
        to = "super::ad_set::Column::Id",
        on_delete = "Cascade"
    )]
    AdSet,
}

impl Related<super::ad_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdSet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
