//! Manual sync triggers.
//!
//! A trigger names a connection and either one sync type or the full chain.
//! The request is answered immediately: accepted (work queued), blocked by
//! the cooldown gate, or rejected. Sync outcomes surface through logs only.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use thiserror::Error;
use uuid::Uuid;

use crate::cooldown::{CooldownGate, CooldownStatus};
use crate::entity::sync_type::SyncType;
use crate::kv::KvError;
use crate::repository::{self, RepositoryError};
use crate::sync::{QueueHandle, StageDescriptor, SyncError, chain_plan, single_plan};

/// Requested type names that select the whole chain.
pub const CHAIN_ALIASES: [&str; 2] = ["all", "chain"];

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Store error: {0}")]
    Store(#[from] KvError),

    #[error("Queue error: {0}")]
    Queue(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

/// Immediate answer to a trigger request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Work was queued.
    Accepted { job_id: Uuid, types: Vec<SyncType> },
    /// A requested type is still cooling down.
    Blocked {
        sync_type: SyncType,
        seconds_left: u64,
    },
    UnknownType { requested: String },
    UnknownConnection,
}

/// What a trigger asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTarget {
    Chain,
    Single(SyncType),
}

impl TriggerTarget {
    /// Parse `all`/`chain` or a single sync type name.
    pub fn parse(requested: &str) -> Option<Self> {
        let trimmed = requested.trim();
        if CHAIN_ALIASES
            .iter()
            .any(|alias| trimmed.eq_ignore_ascii_case(alias))
        {
            return Some(Self::Chain);
        }
        trimmed.parse::<SyncType>().ok().map(Self::Single)
    }

    pub fn plan(self) -> Vec<StageDescriptor> {
        match self {
            Self::Chain => chain_plan(),
            Self::Single(sync_type) => single_plan(sync_type),
        }
    }

    /// Types the cooldown gate checks and stamps, in chain order.
    pub fn types(self) -> Vec<SyncType> {
        match self {
            Self::Chain => SyncType::ALL.to_vec(),
            Self::Single(sync_type) => vec![sync_type],
        }
    }
}

/// Validates, gates and queues sync requests.
#[derive(Clone)]
pub struct SyncTrigger {
    db: Arc<DatabaseConnection>,
    gate: CooldownGate,
    queue: QueueHandle,
}

impl SyncTrigger {
    pub fn new(db: Arc<DatabaseConnection>, gate: CooldownGate, queue: QueueHandle) -> Self {
        Self { db, gate, queue }
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Trigger `requested` for a connection, subject to cooldowns.
    pub async fn trigger(&self, connection_id: Uuid, requested: &str) -> Result<TriggerOutcome> {
        self.dispatch(connection_id, requested, true).await
    }

    /// Trigger without consulting the cooldown gate. Dispatch is still
    /// stamped so later gated triggers see it.
    pub async fn force(&self, connection_id: Uuid, requested: &str) -> Result<TriggerOutcome> {
        self.dispatch(connection_id, requested, false).await
    }

    async fn dispatch(
        &self,
        connection_id: Uuid,
        requested: &str,
        gated: bool,
    ) -> Result<TriggerOutcome> {
        let Some(target) = TriggerTarget::parse(requested) else {
            tracing::info!(requested = %requested, "Rejected trigger for unknown sync type");
            return Ok(TriggerOutcome::UnknownType {
                requested: requested.to_string(),
            });
        };

        if repository::connection::find_by_id(&self.db, connection_id)
            .await?
            .is_none()
        {
            tracing::info!(connection_id = %connection_id, "Rejected trigger for unknown connection");
            return Ok(TriggerOutcome::UnknownConnection);
        }

        let types = target.types();
        if !gated {
            self.gate.force_reserve(connection_id, &types).await?;
        } else if let CooldownStatus::Blocked {
            sync_type,
            seconds_left,
            ..
        } = self.gate.reserve(connection_id, &types).await?
        {
            tracing::info!(
                connection_id = %connection_id,
                sync_type = %sync_type,
                seconds_left,
                "Sync trigger blocked by cooldown"
            );
            return Ok(TriggerOutcome::Blocked {
                sync_type,
                seconds_left,
            });
        }

        // Stamped above, so a trigger racing this one is already blocked.
        let job_id = match self.queue.enqueue(connection_id, target.plan()) {
            Ok(job_id) => job_id,
            Err(e) => {
                if let Err(release_err) = self.gate.release(connection_id, &types).await {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %release_err,
                        "Failed to release cooldown after enqueue failure"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            connection_id = %connection_id,
            job_id = %job_id,
            types = ?types,
            forced = !gated,
            "Sync dispatched"
        );
        Ok(TriggerOutcome::Accepted { job_id, types })
    }
}
