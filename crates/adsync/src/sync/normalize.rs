//! Conversion from raw Graph API records to entity active models.

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use uuid::Uuid;

use crate::entity::{ad, ad_account, ad_campaign, ad_set};
use crate::graph::types::{RawAd, RawAdAccount, RawAdSet, RawCampaign};

/// Stored name when the record carries none.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Stored status when the record carries none.
pub const UNKNOWN_STATUS: &str = "unknown";

fn name_or_unknown(name: Option<String>) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn status_or_unknown(status: Option<String>) -> String {
    status
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_STATUS.to_string())
}

/// Hours east of UTC (possibly fractional) to whole minutes.
fn offset_minutes(hours: f64) -> Option<i32> {
    let minutes = (hours * 60.0).round();
    if minutes.is_finite() && minutes.abs() <= f64::from(24 * 60) {
        Some(minutes as i32)
    } else {
        None
    }
}

/// Convert an ad account owned by `connection_id`.
pub fn to_ad_account(
    raw: RawAdAccount,
    connection_id: Uuid,
    now: DateTime<Utc>,
) -> ad_account::ActiveModel {
    let now = now.fixed_offset();
    let permissions = serde_json::Value::Array(
        raw.user_tasks
            .unwrap_or_default()
            .into_iter()
            .map(serde_json::Value::String)
            .collect(),
    );

    ad_account::ActiveModel {
        id: Set(Uuid::new_v4()),
        connection_id: Set(connection_id),
        external_id: Set(raw.id),
        name: Set(name_or_unknown(raw.name)),
        currency: Set(raw.currency),
        account_status: Set(raw.account_status),
        business_id: Set(raw.business.map(|b| b.id)),
        timezone_name: Set(raw.timezone_name),
        timezone_offset_minutes: Set(raw.timezone_offset_hours_utc.and_then(offset_minutes)),
        permissions: Set(permissions),
        synced_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// Convert a campaign under the local account `ad_account_id`.
pub fn to_ad_campaign(
    raw: RawCampaign,
    ad_account_id: Uuid,
    now: DateTime<Utc>,
) -> ad_campaign::ActiveModel {
    let now = now.fixed_offset();
    ad_campaign::ActiveModel {
        id: Set(Uuid::new_v4()),
        ad_account_id: Set(ad_account_id),
        external_id: Set(raw.id),
        name: Set(name_or_unknown(raw.name)),
        status: Set(status_or_unknown(raw.status)),
        objective: Set(raw.objective),
        synced_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// Convert an ad set under the local campaign `ad_campaign_id`.
pub fn to_ad_set(raw: RawAdSet, ad_campaign_id: Uuid, now: DateTime<Utc>) -> ad_set::ActiveModel {
    let now = now.fixed_offset();
    ad_set::ActiveModel {
        id: Set(Uuid::new_v4()),
        ad_campaign_id: Set(ad_campaign_id),
        external_id: Set(raw.id),
        name: Set(name_or_unknown(raw.name)),
        status: Set(status_or_unknown(raw.status)),
        synced_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// Convert an ad under the local ad set `ad_set_id`.
pub fn to_ad(raw: RawAd, ad_set_id: Uuid, now: DateTime<Utc>) -> ad::ActiveModel {
    let now = now.fixed_offset();
    ad::ActiveModel {
        id: Set(Uuid::new_v4()),
        ad_set_id: Set(ad_set_id),
        external_id: Set(raw.id),
        name: Set(name_or_unknown(raw.name)),
        status: Set(status_or_unknown(raw.status)),
        synced_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::RawBusiness;
    use chrono::TimeZone;
    use sea_orm::ActiveValue;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn value<T: Clone + Into<sea_orm::Value>>(v: &ActiveValue<T>) -> T {
        match v {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => v.clone(),
            ActiveValue::NotSet => panic!("value not set"),
        }
    }

    #[test]
    fn test_ad_account_field_mapping() {
        let connection_id = Uuid::new_v4();
        let raw = RawAdAccount {
            id: "act_42".to_string(),
            name: Some("Main account".to_string()),
            currency: Some("EUR".to_string()),
            account_status: Some(1),
            business: Some(RawBusiness {
                id: "biz_7".to_string(),
                name: Some("Acme".to_string()),
            }),
            timezone_name: Some("Asia/Kolkata".to_string()),
            timezone_offset_hours_utc: Some(5.5),
            user_tasks: Some(vec!["MANAGE".to_string(), "ANALYZE".to_string()]),
        };

        let model = to_ad_account(raw, connection_id, now());
        assert_eq!(value(&model.external_id), "act_42");
        assert_eq!(value(&model.connection_id), connection_id);
        assert_eq!(value(&model.business_id), Some("biz_7".to_string()));
        assert_eq!(value(&model.timezone_offset_minutes), Some(330));
        assert_eq!(value(&model.permissions), json!(["MANAGE", "ANALYZE"]));
        assert_eq!(value(&model.synced_at), now().fixed_offset());
    }

    #[test]
    fn test_missing_name_and_status_default() {
        let campaign = to_ad_campaign(
            RawCampaign {
                id: "c1".to_string(),
                name: None,
                status: None,
                objective: None,
            },
            Uuid::new_v4(),
            now(),
        );
        assert_eq!(value(&campaign.name), UNKNOWN_NAME);
        assert_eq!(value(&campaign.status), UNKNOWN_STATUS);

        let ad = to_ad(
            RawAd {
                id: "ad1".to_string(),
                name: Some("  ".to_string()),
                status: Some("ACTIVE".to_string()),
            },
            Uuid::new_v4(),
            now(),
        );
        assert_eq!(value(&ad.name), UNKNOWN_NAME);
        assert_eq!(value(&ad.status), "ACTIVE");
    }

    #[test]
    fn test_ad_account_without_optional_fields() {
        let raw = RawAdAccount {
            id: "act_1".to_string(),
            name: None,
            currency: None,
            account_status: None,
            business: None,
            timezone_name: None,
            timezone_offset_hours_utc: None,
            user_tasks: None,
        };
        let model = to_ad_account(raw, Uuid::new_v4(), now());
        assert_eq!(value(&model.name), UNKNOWN_NAME);
        assert_eq!(value(&model.permissions), json!([]));
        assert_eq!(value(&model.timezone_offset_minutes), None);
    }

    #[test]
    fn test_parent_linkage_is_set() {
        let parent = Uuid::new_v4();
        let ad_set = to_ad_set(
            RawAdSet {
                id: "as1".to_string(),
                name: Some("Set".to_string()),
                status: Some("PAUSED".to_string()),
            },
            parent,
            now(),
        );
        assert_eq!(value(&ad_set.ad_campaign_id), parent);
    }

    #[test]
    fn test_offset_minutes_rejects_nonsense() {
        assert_eq!(offset_minutes(-3.0), Some(-180));
        assert_eq!(offset_minutes(f64::NAN), None);
        assert_eq!(offset_minutes(100.0), None);
    }
}
