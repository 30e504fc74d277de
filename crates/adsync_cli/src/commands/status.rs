use std::sync::Arc;

use adsync::entity::sync_type::SyncType;
use adsync::repository;
use adsync::status::{StatusChange, StatusUpdateReport, apply_status_changes};
use sea_orm::DatabaseConnection;

use crate::commands::shared::{
    CommandResult, OutputFormat, build_engine, parse_connection_id, print_rows,
};
use crate::config::Config;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct StatusArgs {
    /// Connection id
    connection: String,

    /// Level of the entities: campaigns, ad_sets or ads
    #[arg(short = 't', long = "type")]
    sync_type: SyncType,

    /// Changes as EXTERNAL_ID=STATUS, e.g. 120211=PAUSED
    #[arg(required = true, value_parser = parse_change)]
    changes: Vec<StatusChange>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

fn parse_change(raw: &str) -> Result<StatusChange, String> {
    match raw.split_once('=') {
        Some((id, status)) if !id.trim().is_empty() && !status.trim().is_empty() => {
            Ok(StatusChange::new(id.trim(), status.trim()))
        }
        _ => Err(format!("expected EXTERNAL_ID=STATUS, got '{}'", raw)),
    }
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct ChangeRow {
    #[tabled(rename = "External ID")]
    external_id: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn report_rows(report: StatusUpdateReport) -> Vec<ChangeRow> {
    let mut rows: Vec<ChangeRow> = report
        .applied
        .into_iter()
        .map(|external_id| ChangeRow {
            external_id,
            result: "applied".to_string(),
        })
        .collect();
    rows.extend(report.not_stored.into_iter().map(|external_id| ChangeRow {
        external_id,
        result: "applied upstream, not stored locally".to_string(),
    }));
    rows.extend(report.failed.into_iter().map(|(external_id, reason)| ChangeRow {
        external_id,
        result: format!("failed: {}", reason),
    }));
    rows
}

pub(crate) async fn handle_status(
    args: StatusArgs,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> CommandResult {
    let connection = repository::connection::get(db, parse_connection_id(&args.connection)?).await?;
    let engine = build_engine(config, db, None).await?;
    let client = engine.orchestrator.client_for(&connection)?;

    let report = apply_status_changes(&client, db, args.sync_type, &args.changes).await?;
    let failed = report.failed.len();
    print_rows(report_rows(report), args.output)?;

    if failed > 0 {
        return Err(format!("{} status change(s) failed", failed).into());
    }
    Ok(())
}
