//! SeaORM entity definitions for the adsync database schema.

pub mod ad;
pub mod ad_account;
pub mod ad_campaign;
pub mod ad_set;
pub mod connection;
pub mod kv_entry;
pub mod prelude;
pub mod sync_type;
