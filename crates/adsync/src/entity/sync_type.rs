//! Sync type enum naming each level of the advertising hierarchy.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One level of the account → campaign → ad set → ad hierarchy.
///
/// Used as the key of cooldown timestamps and of the per-connection
/// `last_synced` map. Variants are declared in chain order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    #[sea_orm(string_value = "ad_accounts")]
    AdAccounts,
    #[sea_orm(string_value = "campaigns")]
    Campaigns,
    #[sea_orm(string_value = "ad_sets")]
    AdSets,
    #[sea_orm(string_value = "ads")]
    Ads,
}

impl SyncType {
    /// All sync types in chain order.
    pub const ALL: [SyncType; 4] = [
        SyncType::AdAccounts,
        SyncType::Campaigns,
        SyncType::AdSets,
        SyncType::Ads,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::AdAccounts => "ad_accounts",
            SyncType::Campaigns => "campaigns",
            SyncType::AdSets => "ad_sets",
            SyncType::Ads => "ads",
        }
    }

    /// The type whose rows are the parents of this type, if any.
    #[must_use]
    pub fn parent(self) -> Option<SyncType> {
        match self {
            SyncType::AdAccounts => None,
            SyncType::Campaigns => Some(SyncType::AdAccounts),
            SyncType::AdSets => Some(SyncType::Campaigns),
            SyncType::Ads => Some(SyncType::AdSets),
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ad_accounts" | "adaccounts" | "accounts" => Ok(SyncType::AdAccounts),
            "campaigns" => Ok(SyncType::Campaigns),
            "ad_sets" | "adsets" => Ok(SyncType::AdSets),
            "ads" => Ok(SyncType::Ads),
            _ => Err(format!("Unknown sync type: {}", s)),
        }
    }
}
