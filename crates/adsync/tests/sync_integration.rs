//! Integration tests for the sync engine.
//!
//! Stages, the orchestrator and the worker queue run against an in-memory
//! SQLite database and a scripted transport that answers by URL path.
//!
//! Key scenarios tested:
//! - The chain runs in order and completes with zero accounts
//! - A failing account does not stop its siblings
//! - Re-running a sync keeps internal ids stable
//! - Rate limits are shared across runs for the same connection
//! - The queue drains a full chain before shutdown returns

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adsync::connect_and_migrate;
use adsync::entity::ad_campaign;
use adsync::entity::connection::decode_last_synced;
use adsync::entity::sync_type::SyncType;
use adsync::graph::GraphConfig;
use adsync::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use adsync::kv::{KeyValueStore, MemoryStore};
use adsync::repository::{self, NewConnection};
use adsync::sync::{SyncError, SyncOrchestrator, SyncQueue, chain_plan};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::{Value, json};
use uuid::Uuid;

/// Maximum time any sync operation should take in tests.
/// If exceeded, there's likely a hang/deadlock.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

const BASE_URL: &str = "https://graph.example.com";

/// Transport answering from per-path FIFO queues.
#[derive(Clone, Default)]
struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    routes: HashMap<String, VecDeque<(u16, Value)>>,
    requested: Vec<String>,
}

impl ScriptedTransport {
    /// Queue a response for `/v19.0/{path}`.
    fn respond(&self, path: &str, status: u16, body: Value) {
        self.inner
            .lock()
            .unwrap()
            .routes
            .entry(format!("/v19.0/{path}"))
            .or_default()
            .push_back((status, body));
    }

    /// Queue a single page of `data`.
    fn page(&self, path: &str, data: Value) {
        self.respond(path, 200, json!({ "data": data }));
    }

    fn requested_paths(&self) -> Vec<String> {
        self.inner.lock().unwrap().requested.clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let path = url::Url::parse(&request.url)
            .map_err(|e| HttpError::Transport(e.to_string()))?
            .path()
            .to_string();

        let mut script = self.inner.lock().unwrap();
        script.requested.push(path.clone());
        match script.routes.get_mut(&path).and_then(|q| q.pop_front()) {
            Some((status, body)) => Ok(HttpResponse {
                status,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: body.to_string().into_bytes(),
                from_cache: false,
            }),
            None => Err(HttpError::NoMockResponse {
                method: request.method.as_str().to_string(),
                url: path,
            }),
        }
    }
}

struct Harness {
    db: Arc<DatabaseConnection>,
    transport: ScriptedTransport,
    orchestrator: Arc<SyncOrchestrator>,
    connection_id: Uuid,
}

async fn setup() -> Harness {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    let connection_id = repository::connection::create(
        &db,
        NewConnection {
            user_id: "user-1".to_string(),
            label: "Main".to_string(),
            access_token: "tok".to_string(),
            refresh_token: None,
            token_expires_at: None,
        },
    )
    .await
    .expect("Failed to create connection")
    .id;

    let transport = ScriptedTransport::default();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let db = Arc::new(db);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&db),
        store,
        Arc::new(transport.clone()),
        GraphConfig {
            base_url: BASE_URL.to_string(),
            ..GraphConfig::default()
        },
    ));

    Harness {
        db,
        transport,
        orchestrator,
        connection_id,
    }
}

/// Script a small tree: two accounts, one campaign each, one ad set and one ad.
fn script_tree(transport: &ScriptedTransport) {
    transport.page(
        "me/adaccounts",
        json!([{"id": "act_a", "name": "A"}, {"id": "act_b", "name": "B"}]),
    );
    transport.page("act_a/campaigns", json!([{"id": "c_a", "name": "Spring", "status": "ACTIVE"}]));
    transport.page("act_b/campaigns", json!([{"id": "c_b", "name": "Fall", "status": "PAUSED"}]));
    transport.page("c_a/adsets", json!([{"id": "s_a", "name": "Set", "status": "ACTIVE"}]));
    transport.page("c_b/adsets", json!([]));
    transport.page("s_a/ads", json!([{"id": "ad_1", "status": "ACTIVE"}]));
}

#[tokio::test]
async fn test_chain_with_zero_accounts_completes_every_stage() {
    let h = setup().await;
    h.transport.page("me/adaccounts", json!([]));

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        h.orchestrator.run_chain(h.connection_id, &SyncType::ALL),
    )
    .await
    .expect("chain should not hang")
    .expect("chain should succeed");

    let order: Vec<SyncType> = result.stages.iter().map(|s| s.sync_type).collect();
    assert_eq!(order, SyncType::ALL.to_vec());
    assert_eq!(result.total_upserted(), 0);
    assert_eq!(h.transport.requested_paths(), vec!["/v19.0/me/adaccounts"]);

    let connection = repository::connection::get(&h.db, h.connection_id)
        .await
        .expect("connection");
    assert_eq!(decode_last_synced(&connection.last_synced).len(), 4);
}

#[tokio::test]
async fn test_failing_account_does_not_stop_siblings() {
    let h = setup().await;
    h.transport.page(
        "me/adaccounts",
        json!([{"id": "act_a", "name": "A"}, {"id": "act_b", "name": "B"}]),
    );
    h.transport.respond(
        "act_a/campaigns",
        500,
        json!({"error": {"code": 1, "message": "Please reduce the amount of data"}}),
    );
    h.transport.page("act_b/campaigns", json!([{"id": "c_b", "name": "Fall"}]));

    let result = h
        .orchestrator
        .run_chain(h.connection_id, &[SyncType::AdAccounts, SyncType::Campaigns])
        .await
        .expect("chain should succeed despite one failing account");

    let campaigns = &result.stages[1];
    assert_eq!(campaigns.parents, 2);
    assert_eq!(campaigns.upserted, 1);
    assert_eq!(campaigns.failures.len(), 1);
    assert_eq!(campaigns.failures[0].external_id, "act_a");

    let stored = ad_campaign::Entity::find().all(h.db.as_ref()).await.expect("campaigns");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].external_id, "c_b");
    assert_eq!(stored[0].name, "Fall");
    assert_eq!(stored[0].status, "unknown");
}

#[tokio::test]
async fn test_rerun_keeps_internal_ids() {
    let h = setup().await;
    script_tree(&h.transport);
    h.orchestrator
        .run_chain(h.connection_id, &SyncType::ALL)
        .await
        .expect("first run");
    let first = ad_campaign::Entity::find().all(h.db.as_ref()).await.expect("campaigns");

    script_tree(&h.transport);
    h.orchestrator
        .run_chain(h.connection_id, &SyncType::ALL)
        .await
        .expect("second run");
    let second = ad_campaign::Entity::find().all(h.db.as_ref()).await.expect("campaigns");

    let ids = |rows: &[ad_campaign::Model]| {
        let mut ids: Vec<(String, Uuid)> =
            rows.iter().map(|r| (r.external_id.clone(), r.id)).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&first), ids(&second));

    let counts = repository::hierarchy_counts(&h.db, h.connection_id)
        .await
        .expect("counts");
    assert_eq!(
        (counts.ad_accounts, counts.campaigns, counts.ad_sets, counts.ads),
        (2, 2, 1, 1)
    );
}

#[tokio::test]
async fn test_rate_limit_is_shared_across_runs() {
    let h = setup().await;
    h.transport.respond(
        "me/adaccounts",
        400,
        json!({"error": {"code": 17, "message": "User request limit reached"}}),
    );

    let err = h
        .orchestrator
        .run_stage(h.connection_id, SyncType::AdAccounts)
        .await
        .expect_err("throttled");
    assert!(err.is_retryable());
    assert!(matches!(err, SyncError::Graph(_)));

    // The published window defers the next run without any request.
    let err = h
        .orchestrator
        .run_stage(h.connection_id, SyncType::Campaigns)
        .await
        .expect_err("deferred");
    assert!(matches!(err, SyncError::Throttled { seconds_left, .. } if seconds_left > 0));
    assert_eq!(h.transport.requested_paths().len(), 1);

    let connection = repository::connection::get(&h.db, h.connection_id)
        .await
        .expect("connection");
    assert!(decode_last_synced(&connection.last_synced).is_empty());
}

#[tokio::test]
async fn test_queue_drains_full_chain_on_shutdown() {
    let h = setup().await;
    script_tree(&h.transport);

    let queue = SyncQueue::start(Arc::clone(&h.orchestrator));
    queue
        .handle()
        .enqueue(h.connection_id, chain_plan())
        .expect("enqueue");

    tokio::time::timeout(SYNC_TIMEOUT, queue.shutdown())
        .await
        .expect("shutdown should drain without hanging");

    let counts = repository::hierarchy_counts(&h.db, h.connection_id)
        .await
        .expect("counts");
    assert_eq!(counts.ads, 1);
    assert_eq!(
        h.transport.requested_paths(),
        vec![
            "/v19.0/me/adaccounts",
            "/v19.0/act_a/campaigns",
            "/v19.0/act_b/campaigns",
            "/v19.0/c_a/adsets",
            "/v19.0/c_b/adsets",
            "/v19.0/s_a/ads",
        ]
    );
}
