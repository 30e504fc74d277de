//! Bulk status changes for campaigns, ad sets and ads.
//!
//! Changes are sent upstream as Graph batch requests; each change that the
//! API accepted is then applied to the stored row. Rejected or skipped items
//! leave the local row untouched.
//!
//! Chunks are applied as they complete. If a later chunk request fails, the
//! changes already accepted upstream are still mirrored locally and the
//! rest are reported as failed.

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::sync_type::SyncType;
use crate::graph::{BatchItemResult, BatchOperation, GraphClient, GraphError, MAX_BATCH_SIZE, short_error_message};
use crate::repository::{self, RepositoryError};

#[derive(Debug, Error)]
pub enum StatusUpdateError {
    #[error("Graph API error: {0}")]
    Graph(#[from] GraphError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{0} do not carry a delivery status")]
    UnsupportedType(SyncType),
}

pub type Result<T> = std::result::Result<T, StatusUpdateError>;

/// Requested status for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub external_id: String,
    pub status: String,
}

impl StatusChange {
    pub fn new(external_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            status: status.into(),
        }
    }
}

/// Outcome of [`apply_status_changes`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusUpdateReport {
    /// External ids accepted upstream.
    pub applied: Vec<String>,
    /// Accepted upstream but not stored locally.
    pub not_stored: Vec<String>,
    /// External ids rejected or skipped upstream, with a reason.
    pub failed: Vec<(String, String)>,
}

/// Send `changes` upstream in batches and mirror the accepted ones locally.
pub async fn apply_status_changes(
    client: &GraphClient,
    db: &DatabaseConnection,
    sync_type: SyncType,
    changes: &[StatusChange],
) -> Result<StatusUpdateReport> {
    if sync_type == SyncType::AdAccounts {
        return Err(StatusUpdateError::UnsupportedType(sync_type));
    }

    let mut report = StatusUpdateReport::default();
    let mut chunks = changes.chunks(MAX_BATCH_SIZE);
    while let Some(chunk) = chunks.next() {
        let operations: Vec<BatchOperation> = chunk
            .iter()
            .map(|c| BatchOperation::update_status(&c.external_id, &c.status))
            .collect();

        let results = match client.execute_chunk(&operations).await {
            Ok(results) => results,
            Err(e) => {
                let reason = short_error_message(&e);
                tracing::warn!(
                    sync_type = %sync_type,
                    applied = report.applied.len(),
                    error = %reason,
                    "Status batch request failed"
                );
                for change in chunk.iter().chain(chunks.by_ref().flatten()) {
                    report.failed.push((change.external_id.clone(), reason.clone()));
                }
                break;
            }
        };

        apply_chunk(db, sync_type, chunk, results, &mut report).await?;
    }

    tracing::info!(
        sync_type = %sync_type,
        applied = report.applied.len(),
        not_stored = report.not_stored.len(),
        failed = report.failed.len(),
        "Applied status changes"
    );
    Ok(report)
}

async fn apply_chunk(
    db: &DatabaseConnection,
    sync_type: SyncType,
    chunk: &[StatusChange],
    results: Vec<Option<BatchItemResult>>,
    report: &mut StatusUpdateReport,
) -> Result<()> {
    for (change, result) in chunk.iter().zip(results) {
        match result {
            Some(item) if item.is_success() => {
                let status = change.status.to_uppercase();
                let rows =
                    repository::set_status(db, sync_type, &change.external_id, &status).await?;
                if rows == 0 {
                    report.not_stored.push(change.external_id.clone());
                } else {
                    report.applied.push(change.external_id.clone());
                }
            }
            Some(item) => {
                let reason = item
                    .error_message()
                    .unwrap_or_else(|| format!("HTTP {}", item.code));
                tracing::warn!(
                    sync_type = %sync_type,
                    external_id = %change.external_id,
                    code = item.code,
                    error = %reason,
                    "Status change rejected"
                );
                report.failed.push((change.external_id.clone(), reason));
            }
            None => {
                tracing::warn!(
                    sync_type = %sync_type,
                    external_id = %change.external_id,
                    "Status change skipped by batch"
                );
                report
                    .failed
                    .push((change.external_id.clone(), "skipped".to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    use super::*;
    use crate::graph::GraphConfig;
    use crate::http::{HttpMethod, MockTransport, json_response};

    const BATCH_URL: &str = "https://graph.example.com/v19.0/?access_token=tok";

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

    #[tokio::test]
    async fn accounts_are_rejected_without_requests() {
        let mock = MockTransport::new();
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let err = apply_status_changes(
            &client(&mock),
            &db,
            SyncType::AdAccounts,
            &[StatusChange::new("act_1", "paused")],
        )
        .await
        .expect_err("unsupported");
        assert!(matches!(err, StatusUpdateError::UnsupportedType(SyncType::AdAccounts)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn only_accepted_changes_touch_the_database() {
        let mock = MockTransport::new();
        mock.push_response(
            HttpMethod::Post,
            BATCH_URL,
            json_response(
                200,
                json!([
                    {"code": 200, "body": "{\"success\":true}"},
                    {"code": 400, "body": "{\"error\":{\"message\":\"Invalid status\"}}"},
                    null,
                    {"code": 200, "body": "{\"success\":true}"}
                ]),
            ),
        );
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        let changes = [
            StatusChange::new("c1", "paused"),
            StatusChange::new("c2", "bogus"),
            StatusChange::new("c3", "active"),
            StatusChange::new("c4", "active"),
        ];
        let report = apply_status_changes(&client(&mock), &db, SyncType::Campaigns, &changes)
            .await
            .expect("apply");

        assert_eq!(report.applied, vec!["c1".to_string()]);
        assert_eq!(report.not_stored, vec!["c4".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0], ("c2".to_string(), "Invalid status".to_string()));
        assert_eq!(report.failed[1].1, "skipped");

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        assert!(format!("{:?}", log[0]).contains("PAUSED"));
    }

    #[tokio::test]
    async fn accepted_chunks_are_stored_when_a_later_chunk_fails() {
        let mock = MockTransport::new();
        let successes: Vec<_> = (0..MAX_BATCH_SIZE)
            .map(|_| json!({"code": 200, "body": "{\"success\":true}"}))
            .collect();
        mock.push_response(HttpMethod::Post, BATCH_URL, json_response(200, json!(successes)));
        mock.push_response(
            HttpMethod::Post,
            BATCH_URL,
            json_response(500, json!({"error": {"message": "Service temporarily unavailable"}})),
        );
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results((0..MAX_BATCH_SIZE).map(|_| MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }))
            .into_connection();

        let changes: Vec<_> = (0..=MAX_BATCH_SIZE)
            .map(|i| StatusChange::new(format!("ad{i}"), "paused"))
            .collect();
        let report = apply_status_changes(&client(&mock), &db, SyncType::Ads, &changes)
            .await
            .expect("partial progress is a report, not an error");

        assert_eq!(report.applied.len(), MAX_BATCH_SIZE);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, format!("ad{MAX_BATCH_SIZE}"));
        assert!(report.failed[0].1.contains("Service temporarily unavailable"));
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(db.into_transaction_log().len(), MAX_BATCH_SIZE);
    }
}
