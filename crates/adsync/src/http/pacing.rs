use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::{HttpError, HttpRequest, HttpResponse, HttpTransport};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default outbound pace for Graph API calls (requests per second).
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Proactively paces requests through an inner transport.
///
/// Every `send` waits on a shared governor limiter before delegating, so
/// clones of a `PacedTransport` share one budget.
///
/// ```ignore
/// let transport = PacedTransport::new(ReqwestTransport::with_timeout(timeout)?, 10);
/// ```
pub struct PacedTransport<T> {
    inner: T,
    limiter: Arc<GovernorRateLimiter>,
}

impl<T> PacedTransport<T> {
    /// Wrap `inner`, allowing at most `requests_per_second` (minimum 1).
    pub fn new(inner: T, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Clone> Clone for PacedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for PacedTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.limiter.until_ready().await;
        self.inner.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockTransport, json_response};

    #[tokio::test]
    async fn paced_transport_delegates_to_inner() {
        let mock = MockTransport::new();
        mock.push_json("https://graph.example.com/me", 200, serde_json::json!({"id": "1"}));

        let paced = PacedTransport::new(mock.clone(), 5);
        let resp = paced
            .send(HttpRequest::get("https://graph.example.com/me"))
            .await
            .expect("response");

        assert_eq!(resp, json_response(200, serde_json::json!({"id": "1"})));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn zero_rate_is_clamped_to_one() {
        let mock = MockTransport::new();
        mock.push_json("https://graph.example.com/me", 200, serde_json::json!({}));

        let paced = PacedTransport::new(mock, 0);
        let resp = paced
            .send(HttpRequest::get("https://graph.example.com/me"))
            .await
            .expect("first request is never delayed");
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn clones_share_the_limiter() {
        let paced = PacedTransport::new(MockTransport::new(), 3);
        let cloned = paced.clone();
        assert!(Arc::ptr_eq(&paced.limiter, &cloned.limiter));
    }
}
