//! Sync command: queue a stage or the whole chain for one connection and
//! wait for the queue to drain.

use std::sync::Arc;

use adsync::entity::sync_type::SyncType;
use adsync::repository;
use adsync::sync::SyncQueue;
use adsync::trigger::{SyncTrigger, TriggerOutcome};
use console::style;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::commands::shared::{
    CommandResult, OutputFormat, build_engine, parse_connection_id, print_rows,
};
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::is_shutdown_requested;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SyncArgs {
    /// Connection id
    connection: String,

    /// Sync type: ad_accounts, campaigns, ad_sets, ads, or all for the chain
    #[arg(short = 't', long = "type", default_value = "all")]
    sync_type: String,

    /// Ignore cooldowns (the dispatch is still recorded)
    #[arg(short, long)]
    force: bool,
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct SummaryRow {
    #[tabled(rename = "Type")]
    sync_type: String,
    #[tabled(rename = "Stored")]
    stored: u64,
}

pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> CommandResult {
    let connection_id = parse_connection_id(&args.connection)?;

    let reporter = Arc::new(ProgressReporter::new());
    let engine = build_engine(config, db, Some(reporter.as_callback())).await?;
    let queue = SyncQueue::start(Arc::clone(&engine.orchestrator));
    let trigger = SyncTrigger::new(Arc::clone(db), engine.gate.clone(), queue.handle());

    if is_shutdown_requested() {
        queue.shutdown().await;
        return Ok(());
    }

    let outcome = if args.force {
        trigger.force(connection_id, &args.sync_type).await?
    } else {
        trigger.trigger(connection_id, &args.sync_type).await?
    };

    let message = match outcome {
        TriggerOutcome::Accepted { job_id, types } => {
            tracing::info!(job_id = %job_id, connection_id = %connection_id, stages = types.len(), "Sync queued");
            // Draining runs every successor stage before the workers stop.
            queue.shutdown().await;
            reporter.finish();
            return print_summary(db, connection_id).await;
        }
        TriggerOutcome::Blocked {
            sync_type,
            seconds_left,
        } => format!(
            "{} was synced recently; try again in {} seconds (or pass --force)",
            sync_type, seconds_left
        ),
        TriggerOutcome::UnknownType { requested } => format!(
            "Unknown sync type '{}'; expected one of {}, or all",
            requested,
            SyncType::ALL.map(|t| t.as_str()).join(", ")
        ),
        TriggerOutcome::UnknownConnection => format!("Connection {} not found", connection_id),
    };

    queue.shutdown().await;
    Err(message.into())
}

async fn print_summary(db: &DatabaseConnection, connection_id: Uuid) -> CommandResult {
    let counts = repository::hierarchy_counts(db, connection_id).await?;
    let rows: Vec<SummaryRow> = SyncType::ALL
        .iter()
        .map(|&sync_type| SummaryRow {
            sync_type: sync_type.to_string(),
            stored: counts.get(sync_type),
        })
        .collect();

    println!();
    println!("{}", style("Stored hierarchy").bold());
    print_rows(rows, OutputFormat::Table)
}
