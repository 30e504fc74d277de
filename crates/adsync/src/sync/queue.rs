//! Asynchronous job queue served by a pool of workers.
//!
//! A job is one stage of a plan. A worker runs the stage (retrying throttles
//! with backoff) and, only if it succeeded, enqueues the plan's next stage.
//! Shutdown stops accepting new plans, waits until every queued or running
//! job (including successors of running chains) is done, then stops the
//! workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entity::sync_type::SyncType;
use crate::graph::short_error_message;
use crate::retry::with_retry;

use super::orchestrator::SyncOrchestrator;
use super::progress::{SyncProgress, emit};
use super::types::{Result, SyncError};

/// One stage of a plan and the stage that must succeed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub sync_type: SyncType,
    pub depends_on: Option<SyncType>,
}

/// The full chain: accounts, campaigns, ad sets, ads.
pub fn chain_plan() -> Vec<StageDescriptor> {
    SyncType::ALL
        .iter()
        .map(|&sync_type| StageDescriptor {
            sync_type,
            depends_on: sync_type.parent(),
        })
        .collect()
}

/// A plan running exactly one stage.
pub fn single_plan(sync_type: SyncType) -> Vec<StageDescriptor> {
    vec![StageDescriptor {
        sync_type,
        depends_on: None,
    }]
}

/// A queued stage of a plan.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Shared by every stage of the same plan.
    pub id: Uuid,
    pub connection_id: Uuid,
    pub plan: Arc<[StageDescriptor]>,
    pub position: usize,
}

impl SyncJob {
    pub fn new(connection_id: Uuid, plan: Vec<StageDescriptor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            plan: plan.into(),
            position: 0,
        }
    }

    pub fn stage(&self) -> StageDescriptor {
        self.plan[self.position]
    }

    /// The next stage of the plan, if any.
    pub fn successor(&self) -> Option<SyncJob> {
        let position = self.position + 1;
        (position < self.plan.len()).then(|| SyncJob {
            id: self.id,
            connection_id: self.connection_id,
            plan: Arc::clone(&self.plan),
            position,
        })
    }
}

enum QueueMessage {
    Run(SyncJob),
    Stop,
}

/// Cloneable sender side of the queue.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueMessage>,
    pending: Arc<watch::Sender<usize>>,
    closing: Arc<AtomicBool>,
}

impl QueueHandle {
    /// Queue the first stage of `plan` for `connection_id`.
    ///
    /// Returns the job id shared by every stage of the plan.
    pub fn enqueue(&self, connection_id: Uuid, plan: Vec<StageDescriptor>) -> Result<Uuid> {
        if plan.is_empty() {
            return Err(SyncError::EmptyPlan);
        }
        if self.is_closing() {
            return Err(SyncError::QueueClosed);
        }
        let job = SyncJob::new(connection_id, plan);
        let id = job.id;
        self.push(job)?;
        Ok(id)
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn push(&self, job: SyncJob) -> Result<()> {
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(QueueMessage::Run(job)).is_err() {
            self.finish();
            return Err(SyncError::QueueClosed);
        }
        Ok(())
    }

    fn finish(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// The worker pool.
pub struct SyncQueue {
    handle: QueueHandle,
    workers: Vec<JoinHandle<()>>,
}

impl SyncQueue {
    /// Spawn `orchestrator.options().workers` workers.
    pub fn start(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let handle = QueueHandle {
            tx,
            pending: Arc::new(pending),
            closing: Arc::new(AtomicBool::new(false)),
        };

        let rx = Arc::new(Mutex::new(rx));
        let count = orchestrator.options().workers.max(1);
        let workers = (0..count)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&orchestrator),
                    Arc::clone(&rx),
                    handle.clone(),
                ))
            })
            .collect();

        tracing::debug!(workers = count, "Sync queue started");
        Self { handle, workers }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Wait until no job is queued or running, without closing the queue.
    pub async fn idle(&self) {
        let mut rx = self.handle.pending.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting plans, drain the queue and stop every worker.
    pub async fn shutdown(self) {
        self.handle.closing.store(true, Ordering::SeqCst);
        self.idle().await;

        for _ in &self.workers {
            let _ = self.handle.tx.send(QueueMessage::Stop);
        }
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Sync worker panicked");
            }
        }
        tracing::debug!("Sync queue stopped");
    }
}

async fn worker_loop(
    worker: usize,
    orchestrator: Arc<SyncOrchestrator>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueueMessage>>>,
    handle: QueueHandle,
) {
    loop {
        let message = rx.lock().await.recv().await;
        match message {
            Some(QueueMessage::Run(job)) => {
                let job_id = job.id;
                // A panicking job must not take the worker or the pending
                // count down with it.
                let task = tokio::spawn(process(
                    worker,
                    Arc::clone(&orchestrator),
                    handle.clone(),
                    job,
                ));
                if let Err(e) = task.await {
                    tracing::error!(worker, job_id = %job_id, error = %e, "Sync job panicked");
                }
                handle.finish();
            }
            Some(QueueMessage::Stop) | None => break,
        }
    }
}

async fn process(
    worker: usize,
    orchestrator: Arc<SyncOrchestrator>,
    handle: QueueHandle,
    job: SyncJob,
) {
    let stage = job.stage();
    let label = format!("{}:{}", job.connection_id, stage.sync_type);

    tracing::debug!(
        worker,
        job_id = %job.id,
        connection_id = %job.connection_id,
        sync_type = %stage.sync_type,
        "Running job"
    );

    let outcome = with_retry(
        || orchestrator.run_stage(job.connection_id, stage.sync_type),
        &orchestrator.options().retry,
        |e: &SyncError| e.is_retryable(),
        |e: &SyncError| short_error_message(e),
        &label,
        orchestrator.progress(),
    )
    .await;

    match outcome {
        Ok(_) => {
            if let Some(next) = job.successor() {
                let next_type = next.stage().sync_type;
                if let Err(e) = handle.push(next) {
                    tracing::warn!(
                        job_id = %job.id,
                        sync_type = %next_type,
                        error = %e,
                        "Failed to queue next stage"
                    );
                } else {
                    emit(
                        orchestrator.progress(),
                        SyncProgress::JobQueued {
                            job_id: job.id,
                            connection_id: job.connection_id,
                            sync_type: next_type,
                        },
                    );
                }
            }
        }
        Err(e) => {
            let skipped: Vec<&str> = job.plan[job.position + 1..]
                .iter()
                .map(|s| s.sync_type.as_str())
                .collect();
            tracing::warn!(
                job_id = %job.id,
                connection_id = %job.connection_id,
                sync_type = %stage.sync_type,
                error = %short_error_message(&e),
                skipped = ?skipped,
                "Sync job failed"
            );
        }
    }
}
