//! Runs stages for a connection with the right transport stack and token.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::entity::connection::Model as Connection;
use crate::entity::sync_type::SyncType;
use crate::graph::{GraphClient, GraphConfig, RateLimitSentinel, active_rate_limit, short_error_message};
use crate::http::{CachingTransport, HttpTransport};
use crate::kv::KeyValueStore;
use crate::oauth::{CredentialRenewer, needs_renewal};
use crate::repository;

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::stage::{self, StageContext};
use super::types::{Result, StageReport, SyncError, SyncOptions, SyncResult};

/// Shared engine state used by every worker.
pub struct SyncOrchestrator {
    db: Arc<DatabaseConnection>,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn HttpTransport>,
    graph: GraphConfig,
    cache_ttl: Option<Duration>,
    options: SyncOptions,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl SyncOrchestrator {
    /// `transport` is the base transport (normally paced reqwest); each
    /// connection gets its own rate-limit sentinel around it.
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        graph: GraphConfig,
    ) -> Self {
        Self {
            db,
            store,
            transport,
            graph,
            cache_ttl: None,
            options: SyncOptions::default(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Serve repeated GETs from the store for `ttl`.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn graph_config(&self) -> &GraphConfig {
        &self.graph
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    /// Transport stack for one connection: cache → sentinel → base.
    pub fn transport_for(&self, connection_id: Uuid) -> Arc<dyn HttpTransport> {
        let scope = connection_id.to_string();
        let sentinel =
            RateLimitSentinel::new(Arc::clone(&self.transport), Arc::clone(&self.store), &scope);

        match self.cache_ttl {
            Some(ttl) => Arc::new(CachingTransport::new(
                sentinel,
                Arc::clone(&self.store),
                scope,
                ttl,
            )),
            None => Arc::new(sentinel),
        }
    }

    /// Graph client for `connection` over its transport stack.
    pub fn client_for(&self, connection: &Connection) -> Result<GraphClient> {
        let transport = self.transport_for(connection.id);
        Ok(GraphClient::new(transport, &self.graph, connection.access_token.as_str())?)
    }

    /// Run a single stage for a connection.
    ///
    /// Refuses to start while the connection's shared rate-limit window is
    /// open, and renews credentials that are close to expiry first.
    pub async fn run_stage(&self, connection_id: Uuid, sync_type: SyncType) -> Result<StageReport> {
        let connection = repository::connection::get(&self.db, connection_id).await?;

        if let Some(state) = active_rate_limit(self.store.as_ref(), &connection_id.to_string()).await? {
            let seconds_left = state.remaining(Utc::now()).as_secs().max(1);
            tracing::info!(
                connection_id = %connection_id,
                sync_type = %sync_type,
                seconds_left,
                "Connection is rate limited, deferring stage"
            );
            return Err(SyncError::Throttled {
                connection_id,
                seconds_left,
            });
        }

        let connection = self.ensure_fresh_credentials(connection).await;
        let client = self.client_for(&connection)?;
        let ctx = StageContext {
            db: &self.db,
            client: &client,
            connection: &connection,
            on_progress: self.progress(),
        };

        match stage::run_stage(sync_type, &ctx).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if !e.is_retryable() {
                    tracing::error!(
                        connection_id = %connection_id,
                        sync_type = %sync_type,
                        error = %e,
                        "Sync stage failed"
                    );
                }
                emit(
                    self.progress(),
                    SyncProgress::StageFailed {
                        connection_id,
                        sync_type,
                        error: short_error_message(&e),
                    },
                );
                Err(e)
            }
        }
    }

    /// Run `types` in order, stopping at the first failed stage.
    pub async fn run_chain(&self, connection_id: Uuid, types: &[SyncType]) -> Result<SyncResult> {
        let mut result = SyncResult {
            connection_id,
            stages: Vec::with_capacity(types.len()),
        };
        for &sync_type in types {
            let report = self.run_stage(connection_id, sync_type).await?;
            result.stages.push(report);
        }
        Ok(result)
    }

    async fn ensure_fresh_credentials(&self, connection: Connection) -> Connection {
        let now = Utc::now();
        if !self.options.renew_credentials || !needs_renewal(&connection, now) {
            return connection;
        }

        let renewer = CredentialRenewer::new(
            Arc::clone(&self.db),
            self.transport_for(connection.id),
            self.graph.clone(),
        );
        match renewer.renew_at(&connection, now).await {
            Ok(renewed) => {
                emit(
                    self.progress(),
                    SyncProgress::CredentialsRenewed {
                        connection_id: renewed.id,
                    },
                );
                renewed
            }
            Err(e) => {
                emit(
                    self.progress(),
                    SyncProgress::RenewalFailed {
                        connection_id: connection.id,
                        error: short_error_message(&e),
                    },
                );
                connection
            }
        }
    }
}
