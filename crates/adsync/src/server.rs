//! HTTP surface for manual sync triggers.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use crate::trigger::{SyncTrigger, TriggerOutcome};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub trigger: SyncTrigger,
}

impl AppState {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self { trigger }
    }
}

/// Body of a 429 answer.
#[derive(Debug, Serialize)]
pub struct CooldownBody {
    pub message: String,
    /// Seconds until the blocking type may run again.
    pub retry_after: u64,
    #[serde(rename = "type")]
    pub sync_type: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `POST /connections/{id}/sync/{type}`
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path((id, requested)): Path<(String, String)>,
) -> Response {
    let Ok(connection_id) = Uuid::parse_str(&id) else {
        return error(StatusCode::NOT_FOUND, format!("Unknown connection: {id}"));
    };

    match state.trigger.trigger(connection_id, &requested).await {
        Ok(TriggerOutcome::Accepted { .. }) => (StatusCode::OK, "OK").into_response(),
        Ok(TriggerOutcome::Blocked {
            sync_type,
            seconds_left,
        }) => {
            let body = CooldownBody {
                message: format!(
                    "{sync_type} was synced recently; try again in {seconds_left} seconds"
                ),
                retry_after: seconds_left,
                sync_type: sync_type.to_string(),
            };
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds_left.to_string())],
                Json(body),
            )
                .into_response()
        }
        Ok(TriggerOutcome::UnknownType { requested }) => error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Unknown sync type: {requested}"),
        ),
        Ok(TriggerOutcome::UnknownConnection) => {
            error(StatusCode::NOT_FOUND, format!("Unknown connection: {id}"))
        }
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Sync trigger failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to dispatch sync")
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/connections/:id/sync/:sync_type", post(trigger_sync))
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
