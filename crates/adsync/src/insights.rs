//! Read-side insights queries.
//!
//! The requested date range is clamped to what the API accepts before the
//! first request, then every page of rows is collected through the
//! [`PageWalker`](crate::graph::PageWalker).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::dates::{ClampedRange, clamp_date_range};
use crate::graph::{GraphClient, Result};

/// Fields requested when a query names none.
pub const DEFAULT_INSIGHT_FIELDS: &[&str] = &["impressions", "clicks", "spend"];

/// Aggregation level of insight rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    Account,
    Campaign,
    Adset,
    Ad,
}

impl InsightLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightLevel::Account => "account",
            InsightLevel::Campaign => "campaign",
            InsightLevel::Adset => "adset",
            InsightLevel::Ad => "ad",
        }
    }
}

impl std::str::FromStr for InsightLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "account" => Ok(InsightLevel::Account),
            "campaign" => Ok(InsightLevel::Campaign),
            "adset" => Ok(InsightLevel::Adset),
            "ad" => Ok(InsightLevel::Ad),
            _ => Err(format!("Unknown insight level: {}", s)),
        }
    }
}

/// An insights request for one object (account, campaign, ad set or ad).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsQuery {
    pub object_id: String,
    pub level: Option<InsightLevel>,
    pub fields: Vec<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Rows returned for a query, with the range actually requested.
#[derive(Debug, Clone)]
pub struct InsightsReport {
    pub range: ClampedRange,
    pub rows: Vec<Value>,
}

/// `time_range` parameter value for a clamped range.
pub fn time_range_param(range: &ClampedRange) -> String {
    json!({
        "since": range.from.format("%Y-%m-%d").to_string(),
        "until": range.to.format("%Y-%m-%d").to_string(),
    })
    .to_string()
}

/// First-page URL for `query` over an already clamped range.
pub fn insights_url(client: &GraphClient, query: &InsightsQuery, range: &ClampedRange) -> Result<String> {
    let fields = if query.fields.is_empty() {
        DEFAULT_INSIGHT_FIELDS.join(",")
    } else {
        query.fields.join(",")
    };
    let time_range = time_range_param(range);
    let path = format!("{}/insights", query.object_id);

    let mut params = vec![("fields", fields.as_str()), ("time_range", time_range.as_str())];
    if let Some(level) = query.level {
        params.push(("level", level.as_str()));
    }
    client.endpoint_url(&path, &params)
}

/// Clamp the query's range relative to `today` and fetch every row.
pub async fn fetch_insights(
    client: &GraphClient,
    query: &InsightsQuery,
    today: NaiveDate,
) -> Result<InsightsReport> {
    let range = clamp_date_range(query.from, query.to, today);
    let url = insights_url(client, query, &range)?;
    let rows = client.walker().collect::<Value>(&url).await?;

    tracing::info!(
        object_id = %query.object_id,
        from = %range.from,
        to = %range.to,
        adjusted = range.was_adjusted(),
        rows = rows.len(),
        "Fetched insights"
    );
    Ok(InsightsReport { range, rows })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::GraphConfig;
    use crate::http::MockTransport;

    fn client(mock: &MockTransport) -> GraphClient {
        GraphClient::new(
            Arc::new(mock.clone()),
            &GraphConfig {
                base_url: "https://graph.example.com".to_string(),
                ..GraphConfig::default()
            },
            "tok",
        )
        .expect("client")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn level_parses_loosely() {
        assert_eq!("ad_set".parse::<InsightLevel>(), Ok(InsightLevel::Adset));
        assert_eq!("Campaign".parse::<InsightLevel>(), Ok(InsightLevel::Campaign));
        assert!("creative".parse::<InsightLevel>().is_err());
    }

    #[test]
    fn time_range_uses_iso_dates() {
        let range = clamp_date_range(date(2026, 1, 1), date(2026, 1, 31), date(2026, 10, 19));
        let value: Value = serde_json::from_str(&time_range_param(&range)).unwrap();
        assert_eq!(value["since"], "2026-01-01");
        assert_eq!(value["until"], "2026-01-31");
    }

    #[tokio::test]
    async fn fetch_clamps_before_requesting_and_collects_pages() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let today = date(2026, 10, 19);
        let query = InsightsQuery {
            object_id: "act_1".to_string(),
            level: Some(InsightLevel::Campaign),
            fields: vec!["spend".to_string()],
            from: date(2023, 1, 1),
            to: date(2026, 12, 1),
        };

        let expected = clamp_date_range(query.from, query.to, today);
        assert_eq!(expected.from, date(2023, 9, 19));
        assert_eq!(expected.to, today);

        let first = insights_url(&client, &query, &expected).expect("url");
        let next = "https://graph.example.com/v19.0/act_1/insights?after=x&access_token=tok";
        mock.push_json(
            first.as_str(),
            200,
            json!({"data": [{"spend": "1.00"}], "paging": {"next": next}}),
        );
        mock.push_json(next, 200, json!({"data": [{"spend": "2.50"}]}));

        let report = fetch_insights(&client, &query, today).await.expect("insights");
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.range.adjustments.len(), 2);
        assert_eq!(mock.requests().len(), 2);
        assert!(mock.requests()[0].url.contains("level=campaign"));
    }
}
