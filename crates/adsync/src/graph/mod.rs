//! Graph API client.
//!
//! [`GraphClient`] builds versioned endpoint URLs for one access token and
//! sends everything through an injected [`HttpTransport`], normally a
//! [`RateLimitSentinel`] scoped to the connection.

pub mod batch;
pub mod error;
pub mod pagination;
pub mod sentinel;
pub mod types;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub use batch::{BatchItemResult, BatchOperation, MAX_BATCH_SIZE};
pub use error::{GraphError, Result, short_error_message};
pub use pagination::{PageCursor, PageWalker, WalkSummary};
pub use sentinel::{RateLimitSentinel, RateLimitState, active_rate_limit, is_rate_limited};

use crate::http::{HttpRequest, HttpResponse, HttpTransport, redact_url};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v19.0";
/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Connection settings for the Graph API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
    pub api_version: String,
    /// App credentials, required for token exchange only.
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub page_size: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            app_id: None,
            app_secret: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GraphConfig {
    /// Versioned root, e.g. `https://graph.facebook.com/v19.0/`.
    pub fn versioned_root(&self) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let version = self.api_version.trim_matches('/');
        Ok(Url::parse(&format!("{base}/{version}/"))?)
    }
}

/// Graph API client bound to one access token.
#[derive(Clone)]
pub struct GraphClient {
    transport: Arc<dyn HttpTransport>,
    root: Url,
    access_token: String,
    page_size: u32,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("root", &self.root.as_str())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: &GraphConfig,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            root: config.versioned_root()?,
            access_token: access_token.into(),
            page_size: config.page_size.max(1),
        })
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// A page walker sharing this client's transport.
    pub fn walker(&self) -> PageWalker {
        PageWalker::new(self.transport())
    }

    /// Absolute URL for `path` with `params` and the access token appended.
    pub fn endpoint_url(&self, path: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut url = self.root.join(path.trim_start_matches('/'))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("access_token", &self.access_token);
        }
        Ok(url.into())
    }

    /// First-page URL for an edge such as `act_1/campaigns`.
    pub fn edge_url(&self, path: &str, fields: &str) -> Result<String> {
        let limit = self.page_size.to_string();
        self.endpoint_url(path, &[("fields", fields), ("limit", &limit)])
    }

    /// GET a single object and deserialize it.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.endpoint_url(path, params)?;
        let response = self.transport.send(HttpRequest::get(url.as_str())).await?;
        let response = ensure_success(&url, response)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// POST a JSON body to `path`.
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<HttpResponse> {
        let url = self.endpoint_url(path, &[])?;
        let request = HttpRequest::post_json(url.as_str(), serde_json::to_vec(body)?);
        let response = self.transport.send(request).await?;
        ensure_success(&url, response)
    }
}

fn ensure_success(url: &str, response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let err = GraphError::from_response(&response);
    tracing::warn!(
        url = %redact_url(url),
        status = response.status,
        error = %err,
        "Graph API request failed"
    );
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use serde_json::json;

    fn client(mock: &MockTransport) -> GraphClient {
        let config = GraphConfig {
            base_url: "https://graph.example.com/".to_string(),
            ..GraphConfig::default()
        };
        GraphClient::new(Arc::new(mock.clone()), &config, "tok").expect("client")
    }

    #[test]
    fn endpoint_url_appends_params_and_token() {
        let client = client(&MockTransport::new());
        let url = client
            .endpoint_url("/me/adaccounts", &[("fields", "id,name")])
            .expect("url");
        assert_eq!(
            url,
            "https://graph.example.com/v19.0/me/adaccounts?fields=id%2Cname&access_token=tok"
        );
    }

    #[test]
    fn edge_url_includes_fields_and_limit() {
        let client = client(&MockTransport::new());
        let url = client.edge_url("act_9/campaigns", "id").expect("url");
        assert!(url.starts_with("https://graph.example.com/v19.0/act_9/campaigns?"));
        assert!(url.contains("fields=id"));
        assert!(url.contains("limit=100"));
    }

    #[test]
    fn debug_output_hides_token() {
        let client = client(&MockTransport::new());
        assert!(!format!("{client:?}").contains("tok"));
    }

    #[tokio::test]
    async fn get_json_maps_error_responses() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let url = client.endpoint_url("me", &[]).expect("url");
        mock.push_json(url.as_str(), 400, json!({"error": {"code": 190, "message": "expired"}}));

        let err = client
            .get_json::<serde_json::Value>("me", &[])
            .await
            .expect_err("auth error");
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn get_json_deserializes_success() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let url = client.endpoint_url("me", &[]).expect("url");
        mock.push_json(url.as_str(), 200, json!({"id": "42"}));

        let me: serde_json::Value = client.get_json("me", &[]).await.expect("me");
        assert_eq!(me["id"], "42");
    }
}
