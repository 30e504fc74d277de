use adsync::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::JobQueued {
                job_id,
                connection_id,
                sync_type,
            } => {
                tracing::debug!(job_id = %job_id, connection_id = %connection_id, sync_type = %sync_type, "Queued stage");
            }

            SyncProgress::CredentialsRenewed { connection_id } => {
                tracing::info!(connection_id = %connection_id, "Renewed credentials");
            }

            SyncProgress::RenewalFailed {
                connection_id,
                error,
            } => {
                tracing::warn!(connection_id = %connection_id, error = %error, "Credential renewal failed, using current token");
            }

            SyncProgress::StageStarted {
                connection_id,
                sync_type,
                parents,
            } => {
                tracing::info!(connection_id = %connection_id, sync_type = %sync_type, parents, "Starting stage");
            }

            SyncProgress::FetchingParent {
                sync_type,
                external_id,
            } => {
                tracing::debug!(sync_type = %sync_type, external_id = %external_id, "Fetching children");
            }

            SyncProgress::FetchedPage {
                sync_type,
                parent,
                page,
                count,
            } => {
                tracing::debug!(sync_type = %sync_type, parent = %parent, page, count, "Fetched page");
            }

            SyncProgress::Persisted { sync_type, count } => {
                tracing::debug!(sync_type = %sync_type, count, "Saved to database");
            }

            SyncProgress::ParentSkipped {
                sync_type,
                external_id,
            } => {
                tracing::debug!(sync_type = %sync_type, external_id = %external_id, "No records upstream");
            }

            SyncProgress::ParentFailed {
                sync_type,
                external_id,
                error,
            } => {
                tracing::warn!(sync_type = %sync_type, external_id = %external_id, error = %error, "Parent failed, continuing");
            }

            SyncProgress::StageComplete {
                connection_id,
                sync_type,
                upserted,
                failures,
            } => {
                tracing::info!(connection_id = %connection_id, sync_type = %sync_type, upserted, failures, "Stage complete");
            }

            SyncProgress::StageFailed {
                connection_id,
                sync_type,
                error,
            } => {
                tracing::error!(connection_id = %connection_id, sync_type = %sync_type, error = %error, "Stage failed");
            }

            SyncProgress::RateLimitBackoff {
                label,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(label = %label, retry_after_ms, attempt, "Rate limited, backing off");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
