//! Minimum interval between syncs of one type for one connection.
//!
//! The gate keeps a dispatch timestamp per (connection, sync type) in the
//! shared key-value store, so every trigger process sees the same state.
//! [`evaluate`] is the pure decision over explicit inputs; [`CooldownGate`]
//! wires it to the store.
//!
//! Checking and stamping are two store round trips, so two triggers could
//! both see a type as ready. [`CooldownGate::reserve`] closes that window
//! with a claim key written through
//! [`KeyValueStore::put_if_absent`](crate::kv::KeyValueStore::put_if_absent):
//! only one dispatcher per cooldown period gets to write it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::sync_type::SyncType;
use crate::kv::{self, KeyValueStore};

/// Default cooldown for every sync type.
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 10;

/// Cooldown per sync type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownPolicy {
    pub default_minutes: u64,
    pub overrides: BTreeMap<SyncType, u64>,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            default_minutes: DEFAULT_COOLDOWN_MINUTES,
            overrides: BTreeMap::new(),
        }
    }
}

impl CooldownPolicy {
    #[must_use]
    pub fn with_override(mut self, sync_type: SyncType, minutes: u64) -> Self {
        self.overrides.insert(sync_type, minutes);
        self
    }

    pub fn cooldown(&self, sync_type: SyncType) -> Duration {
        let minutes = self
            .overrides
            .get(&sync_type)
            .copied()
            .unwrap_or(self.default_minutes);
        Duration::minutes(i64::try_from(minutes).unwrap_or(i64::MAX / 60_000))
    }
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownStatus {
    Ready,
    Blocked {
        sync_type: SyncType,
        /// Whole seconds until the type may run again, rounded up.
        seconds_left: u64,
        next_available_at: DateTime<Utc>,
    },
}

impl CooldownStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Decide whether `types` may run at `now`.
///
/// Types are checked in input order; the first one still cooling down
/// blocks. Types never synced are always ready.
pub fn evaluate(
    types: &[SyncType],
    last_synced: &BTreeMap<SyncType, DateTime<Utc>>,
    policy: &CooldownPolicy,
    now: DateTime<Utc>,
) -> CooldownStatus {
    for &sync_type in types {
        let Some(last) = last_synced.get(&sync_type) else {
            continue;
        };
        let next_available_at = *last + policy.cooldown(sync_type);
        if next_available_at > now {
            let remaining_ms = (next_available_at - now).num_milliseconds().max(0) as u64;
            return CooldownStatus::Blocked {
                sync_type,
                seconds_left: remaining_ms.div_ceil(1000),
                next_available_at,
            };
        }
    }
    CooldownStatus::Ready
}

/// Store key of the dispatch timestamp for one connection and type.
pub fn cooldown_key(connection_id: Uuid, sync_type: SyncType) -> String {
    format!("cooldown:{connection_id}:{sync_type}")
}

/// Store key of the dispatch claim for one connection and type.
pub fn claim_key(connection_id: Uuid, sync_type: SyncType) -> String {
    format!("cooldown-claim:{connection_id}:{sync_type}")
}

/// Cooldown enforcement backed by a shared key-value store.
#[derive(Clone)]
pub struct CooldownGate {
    store: Arc<dyn KeyValueStore>,
    policy: CooldownPolicy,
}

impl CooldownGate {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: CooldownPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Last dispatch time of `sync_type` for a connection.
    pub async fn last_synced_at(
        &self,
        connection_id: Uuid,
        sync_type: SyncType,
    ) -> kv::Result<Option<DateTime<Utc>>> {
        kv::get_json(self.store.as_ref(), &cooldown_key(connection_id, sync_type)).await
    }

    pub async fn check(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<CooldownStatus> {
        self.check_at(connection_id, types, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        connection_id: Uuid,
        types: &[SyncType],
        now: DateTime<Utc>,
    ) -> kv::Result<CooldownStatus> {
        let mut last_synced = BTreeMap::new();
        for &sync_type in types {
            if let Some(at) = self.last_synced_at(connection_id, sync_type).await? {
                last_synced.insert(sync_type, at);
            }
        }
        Ok(evaluate(types, &last_synced, &self.policy, now))
    }

    /// Check `types` and, if all are ready, claim and stamp them at once.
    ///
    /// Returns `Ready` only to the one caller that wins the claim for every
    /// type. A losing caller leaves no claims behind.
    pub async fn reserve(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<CooldownStatus> {
        self.reserve_at(connection_id, types, Utc::now()).await
    }

    pub async fn reserve_at(
        &self,
        connection_id: Uuid,
        types: &[SyncType],
        now: DateTime<Utc>,
    ) -> kv::Result<CooldownStatus> {
        let status = self.check_at(connection_id, types, now).await?;
        if !status.is_ready() {
            return Ok(status);
        }

        let stamp = encode_stamp(now)?;
        let mut claimed = Vec::with_capacity(types.len());
        for &sync_type in types {
            let Some(ttl) = self.claim_ttl(sync_type) else {
                continue;
            };
            let key = claim_key(connection_id, sync_type);
            if self.store.put_if_absent(&key, &stamp, Some(ttl)).await? {
                claimed.push(sync_type);
                continue;
            }

            let claimed_at: Option<DateTime<Utc>> = kv::get_json(self.store.as_ref(), &key).await?;
            self.release_claims(connection_id, &claimed).await?;
            tracing::debug!(
                connection_id = %connection_id,
                sync_type = %sync_type,
                "Lost dispatch claim to a concurrent trigger"
            );
            return Ok(self.blocked_by_claim(sync_type, claimed_at.unwrap_or(now), now));
        }

        self.record_sync_at(connection_id, types, now).await?;
        Ok(CooldownStatus::Ready)
    }

    /// Claim and stamp `types` regardless of their cooldown.
    pub async fn force_reserve(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<()> {
        let now = Utc::now();
        let stamp = encode_stamp(now)?;
        for &sync_type in types {
            if let Some(ttl) = self.claim_ttl(sync_type) {
                self.store
                    .put(&claim_key(connection_id, sync_type), &stamp, Some(ttl))
                    .await?;
            }
        }
        self.record_sync_at(connection_id, types, now).await
    }

    /// Drop a reservation whose work never reached the queue.
    ///
    /// Removes both the claims and the stamps, so the types are ready again.
    pub async fn release(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<()> {
        self.release_claims(connection_id, types).await?;
        for &sync_type in types {
            self.store
                .delete(&cooldown_key(connection_id, sync_type))
                .await?;
        }
        Ok(())
    }

    async fn release_claims(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<()> {
        for &sync_type in types {
            self.store.delete(&claim_key(connection_id, sync_type)).await?;
        }
        Ok(())
    }

    fn claim_ttl(&self, sync_type: SyncType) -> Option<std::time::Duration> {
        self.policy
            .cooldown(sync_type)
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }

    fn blocked_by_claim(
        &self,
        sync_type: SyncType,
        claimed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CooldownStatus {
        let last = BTreeMap::from([(sync_type, claimed_at)]);
        match evaluate(&[sync_type], &last, &self.policy, now) {
            CooldownStatus::Ready => CooldownStatus::Blocked {
                sync_type,
                seconds_left: 1,
                next_available_at: now + Duration::seconds(1),
            },
            blocked => blocked,
        }
    }

    /// Stamp `types` as dispatched now.
    ///
    /// Prefer [`reserve`](Self::reserve) when dispatching; this writes the
    /// stamps unconditionally.
    pub async fn record_sync(&self, connection_id: Uuid, types: &[SyncType]) -> kv::Result<()> {
        self.record_sync_at(connection_id, types, Utc::now()).await
    }

    pub async fn record_sync_at(
        &self,
        connection_id: Uuid,
        types: &[SyncType],
        at: DateTime<Utc>,
    ) -> kv::Result<()> {
        for &sync_type in types {
            kv::put_json(
                self.store.as_ref(),
                &cooldown_key(connection_id, sync_type),
                &at,
                None,
            )
            .await?;
        }
        tracing::debug!(
            connection_id = %connection_id,
            types = ?types,
            "Recorded sync dispatch"
        );
        Ok(())
    }
}

fn encode_stamp(at: DateTime<Utc>) -> kv::Result<String> {
    serde_json::to_string(&at).map_err(|e| kv::KvError::invalid_value("cooldown", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::kv::{KeyValueStore, MemoryStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap()
    }

    #[test]
    fn never_synced_is_ready() {
        let status = evaluate(&SyncType::ALL, &BTreeMap::new(), &CooldownPolicy::default(), now());
        assert!(status.is_ready());
    }

    #[test]
    fn synced_five_minutes_ago_is_blocked_for_three_hundred_seconds() {
        let last = BTreeMap::from([(SyncType::Campaigns, now() - Duration::minutes(5))]);
        let status = evaluate(&[SyncType::Campaigns], &last, &CooldownPolicy::default(), now());
        assert_eq!(
            status,
            CooldownStatus::Blocked {
                sync_type: SyncType::Campaigns,
                seconds_left: 300,
                next_available_at: now() + Duration::minutes(5),
            }
        );
    }

    #[test]
    fn synced_eleven_minutes_ago_is_ready() {
        let last = BTreeMap::from([(SyncType::Campaigns, now() - Duration::minutes(11))]);
        let status = evaluate(&[SyncType::Campaigns], &last, &CooldownPolicy::default(), now());
        assert!(status.is_ready());
    }

    #[test]
    fn exactly_at_cooldown_boundary_is_ready() {
        let last = BTreeMap::from([(SyncType::Ads, now() - Duration::minutes(10))]);
        assert!(evaluate(&[SyncType::Ads], &last, &CooldownPolicy::default(), now()).is_ready());
    }

    #[test]
    fn partial_seconds_round_up() {
        let last = BTreeMap::from([(
            SyncType::Ads,
            now() - Duration::minutes(10) + Duration::milliseconds(1500),
        )]);
        match evaluate(&[SyncType::Ads], &last, &CooldownPolicy::default(), now()) {
            CooldownStatus::Blocked { seconds_left, .. } => assert_eq!(seconds_left, 2),
            other => panic!("expected blocked, got {other:?}"),
        }
    }

    #[test]
    fn first_blocking_type_in_input_order_wins() {
        let last = BTreeMap::from([
            (SyncType::AdSets, now() - Duration::minutes(1)),
            (SyncType::Ads, now() - Duration::minutes(2)),
        ]);
        let status = evaluate(
            &[SyncType::AdAccounts, SyncType::Ads, SyncType::AdSets],
            &last,
            &CooldownPolicy::default(),
            now(),
        );
        assert!(matches!(
            status,
            CooldownStatus::Blocked {
                sync_type: SyncType::Ads,
                seconds_left: 480,
                ..
            }
        ));
    }

    #[test]
    fn per_type_overrides_apply() {
        let policy = CooldownPolicy::default().with_override(SyncType::Ads, 30);
        assert_eq!(policy.cooldown(SyncType::Ads), Duration::minutes(30));
        assert_eq!(policy.cooldown(SyncType::Campaigns), Duration::minutes(10));

        let last = BTreeMap::from([(SyncType::Ads, now() - Duration::minutes(20))]);
        assert!(!evaluate(&[SyncType::Ads], &last, &policy, now()).is_ready());
    }

    #[test]
    fn policy_deserializes_overrides_by_type_name() {
        let policy: CooldownPolicy =
            serde_json::from_str(r#"{"overrides": {"ad_sets": 15}}"#).expect("policy");
        assert_eq!(policy.default_minutes, DEFAULT_COOLDOWN_MINUTES);
        assert_eq!(policy.cooldown(SyncType::AdSets), Duration::minutes(15));
    }

    #[tokio::test]
    async fn gate_blocks_after_recording_and_is_scoped_per_connection() {
        let gate = CooldownGate::new(Arc::new(MemoryStore::new()), CooldownPolicy::default());
        let conn = Uuid::new_v4();
        let other = Uuid::new_v4();

        gate.record_sync_at(conn, &[SyncType::Campaigns], now() - Duration::minutes(5))
            .await
            .expect("record");

        let status = gate
            .check_at(conn, &[SyncType::Campaigns], now())
            .await
            .expect("check");
        assert!(matches!(
            status,
            CooldownStatus::Blocked {
                seconds_left: 300,
                ..
            }
        ));

        assert!(
            gate.check_at(other, &[SyncType::Campaigns], now())
                .await
                .expect("check")
                .is_ready()
        );
        assert!(
            gate.check_at(conn, &[SyncType::Ads], now())
                .await
                .expect("check")
                .is_ready()
        );
    }

    #[tokio::test]
    async fn gate_reads_back_recorded_timestamp() {
        let gate = CooldownGate::new(Arc::new(MemoryStore::new()), CooldownPolicy::default());
        let conn = Uuid::new_v4();
        assert_eq!(gate.last_synced_at(conn, SyncType::Ads).await.expect("read"), None);

        gate.record_sync_at(conn, &[SyncType::Ads, SyncType::AdSets], now())
            .await
            .expect("record");
        assert_eq!(
            gate.last_synced_at(conn, SyncType::AdSets).await.expect("read"),
            Some(now())
        );
    }

    #[tokio::test]
    async fn only_one_of_two_gates_sharing_a_store_wins_the_reservation() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = CooldownGate::new(Arc::clone(&store), CooldownPolicy::default());
        let second = CooldownGate::new(store, CooldownPolicy::default());
        let conn = Uuid::new_v4();

        let (a, b) = tokio::join!(
            first.reserve(conn, &[SyncType::Campaigns]),
            second.reserve(conn, &[SyncType::Campaigns]),
        );
        let outcomes = [a.expect("reserve"), b.expect("reserve")];
        assert_eq!(outcomes.iter().filter(|s| s.is_ready()).count(), 1);
        assert!(outcomes.iter().any(|s| matches!(
            s,
            CooldownStatus::Blocked {
                sync_type: SyncType::Campaigns,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn losing_a_claim_leaves_earlier_types_unclaimed() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let gate = CooldownGate::new(Arc::clone(&store), CooldownPolicy::default());
        let conn = Uuid::new_v4();

        // Another dispatcher holds the ads claim but has not stamped yet.
        store
            .put(&claim_key(conn, SyncType::Ads), &encode_stamp(Utc::now()).unwrap(), None)
            .await
            .unwrap();

        let status = gate
            .reserve(conn, &[SyncType::Campaigns, SyncType::Ads])
            .await
            .expect("reserve");
        assert!(matches!(
            status,
            CooldownStatus::Blocked {
                sync_type: SyncType::Ads,
                ..
            }
        ));
        assert_eq!(store.get(&claim_key(conn, SyncType::Campaigns)).await.unwrap(), None);
        assert_eq!(gate.last_synced_at(conn, SyncType::Campaigns).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_makes_types_ready_again() {
        let gate = CooldownGate::new(Arc::new(MemoryStore::new()), CooldownPolicy::default());
        let conn = Uuid::new_v4();

        assert!(gate.reserve(conn, &[SyncType::Ads]).await.unwrap().is_ready());
        assert!(!gate.reserve(conn, &[SyncType::Ads]).await.unwrap().is_ready());

        gate.release(conn, &[SyncType::Ads]).await.unwrap();
        assert!(gate.reserve(conn, &[SyncType::Ads]).await.unwrap().is_ready());
    }
}
