//! Connection entity - one authorized link to the advertising platform.
//!
//! A connection is created per successful external authorization and is
//! owned by exactly one local user. It holds the platform credentials and
//! the completion time of the last sync per [`SyncType`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::sync_type::SyncType;

/// Connection model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local user account that owns this connection.
    pub user_id: String,
    /// Human-readable label.
    pub label: String,

    // ─── Credentials ─────────────────────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub access_token: String,
    #[sea_orm(column_type = "Text", nullable)]
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTimeWithTimeZone>,
    pub token_renewed_at: Option<DateTimeWithTimeZone>,

    // ─── Sync state ──────────────────────────────────────────────────────────
    /// Completion time of the last sync per type: `{"campaigns": "<rfc3339>", ...}`.
    #[sea_orm(column_type = "Json")]
    pub last_synced: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ad_account::Entity")]
    AdAccounts,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the connection holds an access token at all.
    pub fn has_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// Decode the `last_synced` column. Entries that fail to parse are skipped.
    pub fn last_synced_map(&self) -> BTreeMap<SyncType, DateTime<Utc>> {
        decode_last_synced(&self.last_synced)
    }

    /// Completion time of the last sync of `sync_type`.
    pub fn last_synced_at(&self, sync_type: SyncType) -> Option<DateTime<Utc>> {
        self.last_synced_map().get(&sync_type).copied()
    }
}

/// Decode a `last_synced` JSON object into typed timestamps.
pub fn decode_last_synced(value: &serde_json::Value) -> BTreeMap<SyncType, DateTime<Utc>> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };

    object
        .iter()
        .filter_map(|(key, raw)| {
            let sync_type = key.parse::<SyncType>().ok()?;
            let at = DateTime::parse_from_rfc3339(raw.as_str()?).ok()?;
            Some((sync_type, at.with_timezone(&Utc)))
        })
        .collect()
}

/// Encode typed timestamps into the `last_synced` JSON representation.
pub fn encode_last_synced(map: &BTreeMap<SyncType, DateTime<Utc>>) -> serde_json::Value {
    let object = map
        .iter()
        .map(|(sync_type, at)| {
            (
                sync_type.as_str().to_string(),
                serde_json::Value::String(at.to_rfc3339()),
            )
        })
        .collect();
    serde_json::Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn make_connection(token: &str, last_synced: serde_json::Value) -> Model {
        let now = Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            label: "test".to_string(),
            access_token: token.to_string(),
            refresh_token: None,
            token_expires_at: None,
            token_renewed_at: None,
            last_synced,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_has_token() {
        assert!(make_connection("abc", json!({})).has_token());
        assert!(!make_connection("", json!({})).has_token());
        assert!(!make_connection("   ", json!({})).has_token());
    }

    #[test]
    fn test_last_synced_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut map = BTreeMap::new();
        map.insert(SyncType::Campaigns, at);

        let encoded = encode_last_synced(&map);
        assert_eq!(encoded["campaigns"], json!(at.to_rfc3339()));

        let conn = make_connection("abc", encoded);
        assert_eq!(conn.last_synced_at(SyncType::Campaigns), Some(at));
        assert_eq!(conn.last_synced_at(SyncType::Ads), None);
    }

    #[test]
    fn test_decode_skips_garbage() {
        let value = json!({
            "campaigns": "not a timestamp",
            "unknown_type": "2026-01-01T00:00:00Z",
            "ads": "2026-01-01T00:00:00Z",
        });
        let map = decode_last_synced(&value);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&SyncType::Ads));

        assert!(decode_last_synced(&json!([])).is_empty());
    }

    #[test]
    fn test_serialize_hides_credentials() {
        let conn = make_connection("secret-token", json!({}));
        let json = serde_json::to_string(&conn).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
