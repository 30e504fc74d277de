//! Rate-limit detection for every outbound Graph API request.
//!
//! [`is_rate_limited`] classifies a single response. [`RateLimitSentinel`]
//! wraps a transport, turns throttled responses into
//! [`HttpError::RateLimited`] and publishes the throttle in the shared
//! key-value store so other workers for the same connection back off too.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::ErrorEnvelope;
use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport, redact_url};
use crate::kv::{self, KeyValueStore};

/// Graph error codes that signal throttling when returned with HTTP 400.
///
/// Covers application, user, page, custom and business-use-case limits.
pub const RATE_LIMIT_ERROR_CODES: [i64; 14] = [
    4, 17, 32, 613, 80000, 80001, 80002, 80003, 80004, 80005, 80006, 80008, 80009, 80014,
];

/// How long a throttle is published when the response carries no `Retry-After`.
pub const DEFAULT_RATE_LIMIT_TTL: Duration = Duration::from_secs(60);

/// Whether a response is a throttling signal.
///
/// Responses served from a local cache never are.
pub fn is_rate_limited(response: &HttpResponse) -> bool {
    if response.from_cache {
        return false;
    }
    match response.status {
        429 => true,
        400 => error_code(response).is_some_and(|code| RATE_LIMIT_ERROR_CODES.contains(&code)),
        _ => false,
    }
}

/// The `error.code` of a JSON error payload, if any.
pub fn error_code(response: &HttpResponse) -> Option<i64> {
    serde_json::from_slice::<ErrorEnvelope>(&response.body)
        .ok()
        .and_then(|envelope| envelope.error.code)
}

/// The `Retry-After` header as a duration (delta-seconds form only).
pub fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Store key holding the active throttle for a scope.
pub fn rate_limit_key(scope: &str) -> String {
    format!("ratelimit:{scope}")
}

/// A published throttle, readable by any worker sharing the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub status: u16,
    pub code: Option<i64>,
    pub detected_at: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl RateLimitState {
    /// Time left before the throttle lapses, or zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.until - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Read the active throttle for `scope`, if one is published.
pub async fn active_rate_limit(
    store: &dyn KeyValueStore,
    scope: &str,
) -> kv::Result<Option<RateLimitState>> {
    let state: Option<RateLimitState> = kv::get_json(store, &rate_limit_key(scope)).await?;
    Ok(state.filter(|s| s.remaining(Utc::now()) > Duration::ZERO))
}

/// Transport decorator that detects throttling on every response.
pub struct RateLimitSentinel<T> {
    inner: T,
    store: Arc<dyn KeyValueStore>,
    scope: String,
}

impl<T> RateLimitSentinel<T> {
    /// Wrap `inner`; throttles are published under `scope` (the connection id).
    pub fn new(inner: T, store: Arc<dyn KeyValueStore>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            scope: scope.into(),
        }
    }

    async fn publish(&self, response: &HttpResponse) {
        let ttl = retry_after(response).unwrap_or(DEFAULT_RATE_LIMIT_TTL);
        let now = Utc::now();
        let state = RateLimitState {
            status: response.status,
            code: error_code(response),
            detected_at: now,
            until: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60)),
        };

        if let Err(e) =
            kv::put_json(self.store.as_ref(), &rate_limit_key(&self.scope), &state, Some(ttl)).await
        {
            tracing::warn!(scope = %self.scope, error = %e, "Failed to publish rate-limit state");
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RateLimitSentinel<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let response = self.inner.send(request.clone()).await?;

        if !is_rate_limited(&response) {
            return Ok(response);
        }

        tracing::warn!(
            scope = %self.scope,
            status = response.status,
            code = ?error_code(&response),
            url = %redact_url(&request.url),
            "Graph API rate limit detected"
        );
        self.publish(&response).await;

        Err(HttpError::RateLimited {
            request: Box::new(request),
            response: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockTransport, json_response};
    use crate::kv::MemoryStore;
    use serde_json::json;

    const URL: &str = "https://graph.example.com/v19.0/me/adaccounts";

    #[test]
    fn status_429_is_rate_limited() {
        assert!(is_rate_limited(&json_response(429, json!({}))));
    }

    #[test]
    fn denylisted_400_codes_are_rate_limited() {
        for code in RATE_LIMIT_ERROR_CODES {
            let resp = json_response(400, json!({"error": {"code": code, "message": "slow down"}}));
            assert!(is_rate_limited(&resp), "code {code} should be rate limited");
        }
    }

    #[test]
    fn unlisted_400_is_not_rate_limited() {
        let resp = json_response(400, json!({"error": {"code": 100, "message": "bad param"}}));
        assert!(!is_rate_limited(&resp));
    }

    #[test]
    fn cached_responses_are_never_rate_limited() {
        let mut resp = json_response(429, json!({}));
        resp.from_cache = true;
        assert!(!is_rate_limited(&resp));
    }

    #[test]
    fn non_json_400_is_not_rate_limited() {
        let resp = HttpResponse {
            status: 400,
            headers: Vec::new(),
            body: b"oops".to_vec(),
            from_cache: false,
        };
        assert!(!is_rate_limited(&resp));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut resp = json_response(429, json!({}));
        assert_eq!(retry_after(&resp), None);
        resp.headers.push(("retry-after".to_string(), " 12 ".to_string()));
        assert_eq!(retry_after(&resp), Some(Duration::from_secs(12)));
    }

    #[tokio::test]
    async fn sentinel_passes_through_normal_responses() {
        let mock = MockTransport::new();
        mock.push_json(URL, 200, json!({"data": []}));
        let store = Arc::new(MemoryStore::new());
        let sentinel = RateLimitSentinel::new(mock, store.clone(), "conn-1");

        let resp = sentinel.send(HttpRequest::get(URL)).await.expect("response");
        assert_eq!(resp.status, 200);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sentinel_passes_through_non_throttle_errors() {
        let mock = MockTransport::new();
        mock.push_json(URL, 400, json!({"error": {"code": 100}}));
        let sentinel = RateLimitSentinel::new(mock, Arc::new(MemoryStore::new()), "conn-1");

        let resp = sentinel.send(HttpRequest::get(URL)).await.expect("response");
        assert_eq!(resp.status, 400);
    }

    #[tokio::test]
    async fn sentinel_raises_and_publishes_throttle() {
        let mock = MockTransport::new();
        let mut throttled = json_response(400, json!({"error": {"code": 80004}}));
        throttled
            .headers
            .push(("Retry-After".to_string(), "120".to_string()));
        mock.push_response(crate::http::HttpMethod::Get, URL, throttled);
        let store = Arc::new(MemoryStore::new());
        let sentinel = RateLimitSentinel::new(mock, store.clone(), "conn-1");

        let err = sentinel
            .send(HttpRequest::get(URL))
            .await
            .expect_err("throttled");
        match &err {
            HttpError::RateLimited { request, response } => {
                assert_eq!(request.url, URL);
                assert_eq!(response.status, 400);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let state = active_rate_limit(store.as_ref(), "conn-1")
            .await
            .expect("read")
            .expect("published");
        assert_eq!(state.code, Some(80004));
        assert!(state.remaining(Utc::now()) > Duration::from_secs(100));

        let other = active_rate_limit(store.as_ref(), "conn-2").await.expect("read");
        assert!(other.is_none());
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let now = Utc::now();
        let state = RateLimitState {
            status: 429,
            code: None,
            detected_at: now - chrono::Duration::seconds(120),
            until: now - chrono::Duration::seconds(60),
        };
        assert_eq!(state.remaining(now), Duration::ZERO);
    }
}
