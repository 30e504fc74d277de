use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport, redact_url};
use crate::kv::{KeyValueStore, get_json, put_json};

/// Key under which a GET response for `url` is cached within `namespace`.
///
/// Credentials are stripped so tokens never end up in store keys; the
/// namespace keeps token-relative URLs like `me/adaccounts` apart.
#[must_use]
pub fn cache_key(namespace: &str, url: &str) -> String {
    format!("httpcache:{namespace}:{}", redact_url(url))
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: HttpHeaders,
    body: String,
}

/// Serves repeated successful GETs from the key-value store.
///
/// Only 2xx GET responses with a UTF-8 body are stored; everything else
/// passes straight through. Store failures are logged and never fail the
/// request.
pub struct CachingTransport<T> {
    inner: T,
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    namespace: String,
}

impl<T> CachingTransport<T> {
    /// Cache under `namespace`, normally the connection id.
    pub fn new(
        inner: T,
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            store,
            ttl,
            namespace: namespace.into(),
        }
    }

    async fn lookup(&self, key: &str) -> Option<HttpResponse> {
        match get_json::<CachedResponse>(self.store.as_ref(), key).await {
            Ok(Some(cached)) => Some(HttpResponse {
                status: cached.status,
                headers: cached.headers,
                body: cached.body.into_bytes(),
                from_cache: true,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read cached response");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &HttpResponse) {
        let Ok(body) = std::str::from_utf8(&response.body) else {
            return;
        };
        let cached = CachedResponse {
            status: response.status,
            headers: response.headers.clone(),
            body: body.to_string(),
        };
        if let Err(e) = put_json(self.store.as_ref(), key, &cached, Some(self.ttl)).await {
            tracing::warn!(key = %key, error = %e, "Failed to cache response");
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for CachingTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if request.method != HttpMethod::Get {
            return self.inner.send(request).await;
        }

        let key = cache_key(&self.namespace, &request.url);
        if let Some(hit) = self.lookup(&key).await {
            tracing::debug!(key = %key, "Serving response from cache");
            return Ok(hit);
        }

        let response = self.inner.send(request).await?;
        if response.is_success() {
            self.store(&key, &response).await;
        }
        Ok(response)
    }
}
