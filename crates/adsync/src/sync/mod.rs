//! Synchronization of the ad hierarchy.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncError`, `StageReport`, `SyncResult`, `SyncOptions`
//! - [`progress`] - `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`normalize`] - raw Graph records to active models
//! - [`stage`] - the `EntitySyncStage` trait, one implementation per level
//! - [`orchestrator`] - `SyncOrchestrator`: transport stack, renewal, chains
//! - [`queue`] - `SyncQueue`: worker pool running plans stage by stage
//!
//! # Example
//!
//! ```ignore
//! use adsync::sync::{SyncOrchestrator, SyncQueue, chain_plan};
//!
//! let orchestrator = Arc::new(SyncOrchestrator::new(db, store, transport, graph));
//! let queue = SyncQueue::start(Arc::clone(&orchestrator));
//! queue.handle().enqueue(connection_id, chain_plan())?;
//! queue.shutdown().await;
//! ```

pub mod normalize;
pub mod orchestrator;
mod progress;
pub mod queue;
pub mod stage;
mod types;

pub use orchestrator::SyncOrchestrator;
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use queue::{QueueHandle, StageDescriptor, SyncJob, SyncQueue, chain_plan, single_plan};
pub use stage::{
    AccountStage, AdSetStage, AdStage, CampaignStage, EntitySyncStage, StageContext, run_stage,
};
pub use types::{
    DEFAULT_WORKERS, ParentFailure, Result, StageReport, SyncError, SyncOptions, SyncResult,
};
