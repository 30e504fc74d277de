use std::sync::Arc;

use adsync::server::{self, AppState};
use adsync::sync::SyncQueue;
use adsync::trigger::SyncTrigger;
use sea_orm::DatabaseConnection;

use crate::commands::shared::{CommandResult, build_engine};
use crate::config::Config;
use crate::progress::{LoggingReporter, ProgressReporter};
use crate::shutdown::wait_for_shutdown;

/// Serve the trigger endpoint until Ctrl+C, then drain queued stages.
pub(crate) async fn handle_serve(
    bind: Option<String>,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> CommandResult {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    // A server never owns the terminal, so progress always goes to the log.
    let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
    let engine = build_engine(config, db, Some(reporter.as_callback())).await?;
    let queue = SyncQueue::start(Arc::clone(&engine.orchestrator));
    let trigger = SyncTrigger::new(Arc::clone(db), engine.gate, queue.handle());

    tracing::debug!(workers = engine.orchestrator.options().workers, "Sync workers ready");
    let served = server::serve(&bind, Arc::new(AppState::new(trigger)), wait_for_shutdown()).await;

    tracing::info!(pending = queue.handle().pending(), "Server stopped, draining sync queue");
    queue.shutdown().await;

    served?;
    Ok(())
}
