//! Wire types for Graph API responses.

use serde::Deserialize;

/// One page of a cursor-paginated edge.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl<T> Page<T> {
    /// The opaque continuation URL, if another page exists.
    pub fn next_url(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_deref())
            .filter(|next| !next.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

/// `{ "error": { ... } }` payload returned with non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBusiness {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// An ad account as returned by `/me/adaccounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAdAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub account_status: Option<i32>,
    #[serde(default)]
    pub business: Option<RawBusiness>,
    #[serde(default)]
    pub timezone_name: Option<String>,
    #[serde(default)]
    pub timezone_offset_hours_utc: Option<f64>,
    #[serde(default)]
    pub user_tasks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCampaign {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAdSet {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAd {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Field selections requested for each edge.
pub mod fields {
    pub const AD_ACCOUNT: &str = "id,name,currency,account_status,business,timezone_name,timezone_offset_hours_utc,user_tasks";
    pub const CAMPAIGN: &str = "id,name,status,objective";
    pub const AD_SET: &str = "id,name,status";
    pub const AD: &str = "id,name,status";
}
