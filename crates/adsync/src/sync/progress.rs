//! Progress reporting types for sync operations.
//!
//! The engine reports what it is doing through [`SyncProgress`] events so the
//! binary can drive progress bars or logs without the library knowing which.

use uuid::Uuid;

use crate::entity::sync_type::SyncType;

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A sync job was accepted onto the queue.
    JobQueued {
        job_id: Uuid,
        connection_id: Uuid,
        sync_type: SyncType,
    },

    /// Credentials were renewed before running a stage.
    CredentialsRenewed { connection_id: Uuid },

    /// Renewal failed; the stage continues with the current token.
    RenewalFailed { connection_id: Uuid, error: String },

    /// Starting a stage.
    StageStarted {
        connection_id: Uuid,
        sync_type: SyncType,
        /// Number of parents to walk (1 for accounts).
        parents: usize,
    },

    /// Starting the walk for one parent.
    FetchingParent {
        sync_type: SyncType,
        external_id: String,
    },

    /// Fetched a page of records.
    FetchedPage {
        sync_type: SyncType,
        /// Parent external id the page belongs to.
        parent: String,
        /// Page number within the parent walk (1-indexed).
        page: usize,
        count: usize,
    },

    /// A page of records was upserted.
    Persisted { sync_type: SyncType, count: u64 },

    /// A parent had no children upstream.
    ParentSkipped {
        sync_type: SyncType,
        external_id: String,
    },

    /// A parent's walk failed; the stage moves on.
    ParentFailed {
        sync_type: SyncType,
        external_id: String,
        error: String,
    },

    /// Stage finished and `last_synced` was advanced.
    StageComplete {
        connection_id: Uuid,
        sync_type: SyncType,
        upserted: u64,
        failures: usize,
    },

    /// Stage aborted; later stages of the chain will not run.
    StageFailed {
        connection_id: Uuid,
        sync_type: SyncType,
        error: String,
    },

    /// Throttled, backing off before retry.
    RateLimitBackoff {
        /// What is being retried (e.g. `campaigns`).
        label: String,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Warning message (non-fatal).
    Warning { message: String },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
