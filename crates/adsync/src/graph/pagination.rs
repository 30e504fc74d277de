//! Cursor pagination over Graph API edges.
//!
//! Pages are `{ data: [...], paging: { next } }`. The walk requests the
//! starting URL, then follows `paging.next` verbatim until a page has none.
//! No retries happen here; throttling surfaces as
//! [`GraphError::RateLimited`] for the worker layer to handle.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::error::{GraphError, Result};
use super::types::Page;
use crate::http::{HttpRequest, HttpTransport, redact_url};

/// Totals for a completed walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub pages: usize,
    pub records: usize,
}

/// Follows cursor pagination through an injected transport.
#[derive(Clone)]
pub struct PageWalker {
    transport: Arc<dyn HttpTransport>,
}

impl PageWalker {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Start a pull-based walk at `start_url`.
    pub fn pages<T: DeserializeOwned>(&self, start_url: impl Into<String>) -> PageCursor<'_, T> {
        PageCursor {
            transport: self.transport.as_ref(),
            next: Some(start_url.into()),
            summary: WalkSummary::default(),
            _record: PhantomData,
        }
    }

    /// Walk every page, invoking `on_page` once per page with that page's
    /// records.
    ///
    /// An error from `on_page` stops the walk and is returned as is.
    pub async fn walk<T, F>(&self, start_url: &str, mut on_page: F) -> Result<WalkSummary>
    where
        T: DeserializeOwned,
        F: FnMut(Vec<T>) -> Result<()>,
    {
        let mut cursor = self.pages::<T>(start_url);
        while let Some(records) = cursor.next_page().await? {
            on_page(records)?;
        }
        Ok(cursor.summary())
    }

    /// Walk every page and collect all records.
    pub async fn collect<T: DeserializeOwned>(&self, start_url: &str) -> Result<Vec<T>> {
        let mut all = Vec::new();
        self.walk(start_url, |records: Vec<T>| {
            all.extend(records);
            Ok(())
        })
        .await?;
        Ok(all)
    }
}

/// An in-progress walk, yielding one page of records per call.
pub struct PageCursor<'a, T> {
    transport: &'a dyn HttpTransport,
    next: Option<String>,
    summary: WalkSummary,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PageCursor<'_, T> {
    /// Fetch the next page, or `None` once the last page has been consumed.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let response = self.transport.send(HttpRequest::get(url.as_str())).await?;

        if !response.is_success() {
            let err = GraphError::from_response(&response);
            tracing::warn!(
                url = %redact_url(&url),
                status = response.status,
                page = self.summary.pages + 1,
                error = %err,
                "Graph API page request failed"
            );
            return Err(err);
        }

        let page: Page<T> = serde_json::from_slice(&response.body)?;
        self.next = page.next_url().map(str::to_string);
        self.summary.pages += 1;
        self.summary.records += page.data.len();

        tracing::debug!(
            url = %redact_url(&url),
            page = self.summary.pages,
            records = page.data.len(),
            has_next = self.next.is_some(),
            "Fetched page"
        );

        Ok(Some(page.data))
    }

    pub fn summary(&self) -> WalkSummary {
        self.summary
    }
}
