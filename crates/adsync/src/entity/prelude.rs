//! Common re-exports for convenient entity usage.

pub use super::ad::{
    ActiveModel as AdActiveModel, Column as AdColumn, Entity as Ad, Model as AdModel,
};
pub use super::ad_account::{
    ActiveModel as AdAccountActiveModel, Column as AdAccountColumn, Entity as AdAccount,
    Model as AdAccountModel,
};
pub use super::ad_campaign::{
    ActiveModel as AdCampaignActiveModel, Column as AdCampaignColumn, Entity as AdCampaign,
    Model as AdCampaignModel,
};
pub use super::ad_set::{
    ActiveModel as AdSetActiveModel, Column as AdSetColumn, Entity as AdSet,
    Model as AdSetModel,
};
pub use super::connection::{
    ActiveModel as ConnectionActiveModel, Column as ConnectionColumn, Entity as Connection,
    Model as ConnectionModel,
};
pub use super::kv_entry::{
    ActiveModel as KvEntryActiveModel, Column as KvEntryColumn, Entity as KvEntry,
    Model as KvEntryModel,
};
pub use super::sync_type::SyncType;
