//! Wiring shared by the commands: store, transport and orchestrator.

use std::sync::Arc;

use adsync::cooldown::CooldownGate;
use adsync::http::reqwest_transport::ReqwestTransport;
use adsync::http::{HttpTransport, PacedTransport};
use adsync::kv::{DatabaseStore, KeyValueStore, MemoryStore};
use adsync::sync::{ProgressCallback, SyncOrchestrator};
use clap::ValueEnum;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};

pub(crate) type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Print rows as a rounded table or pretty JSON.
pub(crate) fn print_rows<T>(rows: Vec<T>, format: OutputFormat) -> CommandResult
where
    T: tabled::Tabled + serde::Serialize,
{
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Parse a connection id argument.
pub(crate) fn parse_connection_id(raw: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("'{}' is not a valid connection id", raw).into())
}

/// Shared key-value store for the configured backend.
pub(crate) async fn build_store(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<Arc<dyn KeyValueStore>, Box<dyn std::error::Error>> {
    match config.store.backend {
        StoreBackend::Database => Ok(Arc::new(DatabaseStore::new(Arc::clone(db)))),
        StoreBackend::Memory => {
            tracing::warn!("Using in-process store; cooldowns and throttles are not shared");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis => {
            let store = adsync::kv::RedisStore::connect(
                &config.store.redis_url,
                config.store.redis_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => {
            Err("Redis store requested but adsync was built without the 'redis' feature".into())
        }
    }
}

/// Base transport: reqwest with the configured timeout, paced unless disabled.
pub(crate) fn build_transport(
    config: &Config,
) -> Result<Arc<dyn HttpTransport>, Box<dyn std::error::Error>> {
    let reqwest = ReqwestTransport::with_timeout(config.request_timeout())?;
    if config.graph.requests_per_second == 0 {
        return Ok(Arc::new(reqwest));
    }
    Ok(Arc::new(PacedTransport::new(
        reqwest,
        config.graph.requests_per_second,
    )))
}

/// Everything a sync or serve command needs.
pub(crate) struct Engine {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub gate: CooldownGate,
}

pub(crate) async fn build_engine(
    config: &Config,
    db: &Arc<DatabaseConnection>,
    on_progress: Option<ProgressCallback>,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let store = build_store(config, db).await?;
    let transport = build_transport(config)?;

    let mut orchestrator = SyncOrchestrator::new(
        Arc::clone(db),
        Arc::clone(&store),
        transport,
        config.graph_config(),
    )
    .with_options(config.sync_options())
    .with_cache_ttl(config.cache_ttl());
    if let Some(callback) = on_progress {
        orchestrator = orchestrator.with_progress(callback);
    }

    Ok(Engine {
        orchestrator: Arc::new(orchestrator),
        gate: CooldownGate::new(store, config.cooldown_policy()?),
    })
}
