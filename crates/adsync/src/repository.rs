//! Persistence operations for connections and the ad hierarchy.
//!
//! Functions take a [`sea_orm::DatabaseConnection`] and return plain models
//! or value types. Relationships are resolved by explicit id lists; nothing
//! here traverses relations lazily.

mod bulk;
pub mod connection;
mod errors;
mod query;
mod status;

pub use bulk::{
    DEFAULT_BULK_UPSERT_BACKOFF, DEFAULT_BULK_UPSERT_RETRIES, upsert_ad_accounts,
    upsert_ad_campaigns,
};
pub(crate) use bulk::{
    ad_account_on_conflict, ad_campaign_on_conflict, ad_on_conflict, ad_set_on_conflict,
    upsert_with_retry,
};
pub use connection::{NewConnection, TokenUpdate};
pub use errors::{RepositoryError, Result};
pub use query::{
    HierarchyCounts, ParentRef, account_refs, ad_set_refs, campaign_refs, hierarchy_counts,
    parent_refs,
};
pub use status::set_status;
