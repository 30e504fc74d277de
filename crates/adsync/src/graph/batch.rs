//! Graph API batch requests.
//!
//! A batch is one POST whose JSON body is `{ "batch": [ ... ] }`, each item
//! a sub-request with a method, a relative URL and a form-encoded body. The
//! response is an array with one `{ code, body }` per item, or `null` for
//! items the API skipped.

use serde::Deserialize;
use serde_json::{Value, json};

use super::GraphClient;
use super::error::{GraphError, Result};
use crate::http::HttpMethod;

/// Maximum sub-requests per batch call.
pub const MAX_BATCH_SIZE: usize = 50;

/// A single sub-request within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOperation {
    pub method: HttpMethod,
    pub relative_url: String,
    pub body: Vec<(String, String)>,
}

impl BatchOperation {
    /// Set the delivery status of one campaign, ad set or ad.
    pub fn update_status(external_id: &str, status: &str) -> Self {
        Self {
            method: HttpMethod::Post,
            relative_url: external_id.to_string(),
            body: vec![("status".to_string(), status.to_uppercase())],
        }
    }

    /// The form-encoded sub-request body.
    pub fn encoded_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.body.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish()
    }

    fn to_json(&self) -> Value {
        let mut item = json!({
            "method": self.method.as_str(),
            "relative_url": self.relative_url,
        });
        if !self.body.is_empty() {
            item["body"] = Value::String(self.encoded_body());
        }
        item
    }
}

/// JSON body for one batch call.
pub fn batch_body(operations: &[BatchOperation]) -> Value {
    json!({ "batch": operations.iter().map(BatchOperation::to_json).collect::<Vec<_>>() })
}

/// The outcome of one sub-request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchItemResult {
    pub code: u16,
    #[serde(default)]
    pub body: Option<String>,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The error message from a failed sub-request body, if parseable.
    pub fn error_message(&self) -> Option<String> {
        let body: Value = serde_json::from_str(self.body.as_deref()?).ok()?;
        body["error"]["message"].as_str().map(str::to_string)
    }
}

/// Parse a batch response; skipped items come back as `None`.
pub fn parse_batch_response(body: &[u8]) -> Result<Vec<Option<BatchItemResult>>> {
    Ok(serde_json::from_slice(body)?)
}

impl GraphClient {
    /// Execute operations in chunks of [`MAX_BATCH_SIZE`].
    ///
    /// Results line up with `operations`. A failed chunk request aborts the
    /// remaining chunks and discards the results of earlier ones; callers
    /// that must act on partial progress use [`execute_chunk`](Self::execute_chunk).
    pub async fn execute_batch(
        &self,
        operations: &[BatchOperation],
    ) -> Result<Vec<Option<BatchItemResult>>> {
        let mut results = Vec::with_capacity(operations.len());
        for chunk in operations.chunks(MAX_BATCH_SIZE) {
            results.append(&mut self.execute_chunk(chunk).await?);
        }
        Ok(results)
    }

    /// Send one batch request of at most [`MAX_BATCH_SIZE`] operations.
    pub async fn execute_chunk(
        &self,
        chunk: &[BatchOperation],
    ) -> Result<Vec<Option<BatchItemResult>>> {
        if chunk.len() > MAX_BATCH_SIZE {
            return Err(GraphError::Api {
                status: 0,
                code: None,
                message: format!(
                    "batch of {} operations exceeds the limit of {MAX_BATCH_SIZE}",
                    chunk.len()
                ),
            });
        }

        let response = self.post_json("", &batch_body(chunk)).await?;
        let items = parse_batch_response(&response.body)?;

        if items.len() != chunk.len() {
            return Err(GraphError::Api {
                status: response.status,
                code: None,
                message: format!(
                    "batch returned {} results for {} operations",
                    items.len(),
                    chunk.len()
                ),
            });
        }

        tracing::debug!(
            operations = chunk.len(),
            failed = items
                .iter()
                .filter(|i| !i.as_ref().is_some_and(BatchItemResult::is_success))
                .count(),
            "Executed batch chunk"
        );
        Ok(items)
    }
}
