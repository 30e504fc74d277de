//! Shared sync types: errors, per-stage reports and worker options.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::sync_type::SyncType;
use crate::graph::GraphError;
use crate::kv::KvError;
use crate::repository::RepositoryError;
use crate::retry::RetryConfig;

/// Default number of queue workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors that abort a stage (and with it the rest of a chain).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Graph API error: {0}")]
    Graph(#[from] GraphError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Store error: {0}")]
    Store(#[from] KvError),

    /// The connection is inside an active rate-limit window.
    #[error("Connection {connection_id} is rate limited for another {seconds_left}s")]
    Throttled { connection_id: Uuid, seconds_left: u64 },

    #[error("Failed to load parents for {sync_type}: {source}")]
    ParentLoad {
        sync_type: SyncType,
        #[source]
        source: RepositoryError,
    },

    #[error("Failed to record completion of {sync_type}: {source}")]
    Completion {
        sync_type: SyncType,
        #[source]
        source: RepositoryError,
    },

    #[error("Sync queue is closed")]
    QueueClosed,

    #[error("Sync plan has no stages")]
    EmptyPlan,
}

impl SyncError {
    /// Whether the worker should back off and run the stage again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Graph(e) => e.is_rate_limited(),
            SyncError::Throttled { .. } => true,
            _ => false,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Graph(e) if e.is_auth_error())
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// One parent whose children could not be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFailure {
    pub parent_id: Uuid,
    pub external_id: String,
    pub error: String,
}

/// Outcome of one completed stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub sync_type: SyncType,
    /// Parents walked (1 for the accounts stage).
    pub parents: usize,
    /// Parents with zero records upstream.
    pub parents_skipped: usize,
    pub pages: usize,
    pub fetched: usize,
    pub upserted: u64,
    /// Isolated per-parent failures; the stage still completed.
    pub failures: Vec<ParentFailure>,
    pub completed_at: DateTime<Utc>,
}

impl StageReport {
    pub(crate) fn new(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            parents: 0,
            parents_skipped: 0,
            pages: 0,
            fetched: 0,
            upserted: 0,
            failures: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result of running one or more stages for a connection.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub connection_id: Uuid,
    pub stages: Vec<StageReport>,
}

impl SyncResult {
    pub fn total_upserted(&self) -> u64 {
        self.stages.iter().map(|s| s.upserted).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(|s| s.failures.len()).sum()
    }
}

/// Options for the orchestrator and its worker pool.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent queue workers.
    pub workers: usize,
    /// Backoff for throttled stages.
    pub retry: RetryConfig,
    /// Renew credentials that are close to expiry before each stage.
    pub renew_credentials: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryConfig::default(),
            renew_credentials: true,
        }
    }
}
