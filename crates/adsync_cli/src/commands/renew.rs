use std::sync::Arc;

use adsync::oauth::{RenewalSummary, renew_due};
use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::commands::shared::{CommandResult, OutputFormat, build_engine, print_rows};
use crate::config::Config;

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct RenewalRow {
    #[tabled(rename = "Connection")]
    connection_id: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn summary_rows(summary: RenewalSummary) -> Vec<RenewalRow> {
    let renewed = summary.renewed.into_iter().map(|id| RenewalRow {
        connection_id: id.to_string(),
        result: "renewed".to_string(),
    });
    let failed = summary.failed.into_iter().map(|(id, error)| RenewalRow {
        connection_id: id.to_string(),
        result: format!("failed: {}", error),
    });
    renewed.chain(failed).collect()
}

/// Renew every connection whose token expires within the renewal window.
pub(crate) async fn handle_renew(
    output: OutputFormat,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> CommandResult {
    let engine = build_engine(config, db, None).await?;
    let orchestrator = engine.orchestrator;

    let summary = renew_due(
        db,
        orchestrator.graph_config(),
        |connection_id| orchestrator.transport_for(connection_id),
        Utc::now(),
    )
    .await?;

    tracing::info!(
        renewed = summary.renewed.len(),
        failed = summary.failed.len(),
        "Credential renewal finished"
    );

    if summary.renewed.is_empty() && summary.failed.is_empty() {
        println!("No connections due for renewal.");
        return Ok(());
    }
    print_rows(summary_rows(summary), output)
}
