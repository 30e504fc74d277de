//! Shared key-value state.
//!
//! Rate-limit markers and cooldown timestamps must be visible to every
//! worker that talks to the same connection, possibly in other processes.
//! [`KeyValueStore`] abstracts that store; [`DatabaseStore`] keeps entries in
//! the application database, [`RedisStore`] (feature `redis`) in Redis, and
//! [`MemoryStore`] in-process for single-process runs and tests.

mod database;
mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub use database::{DatabaseStore, purge_expired};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Errors raised by key-value store backends.
#[derive(Debug, Error)]
pub enum KvError {
    /// Database backend error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Redis backend error.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A stored value could not be (de)serialized.
    #[error("Invalid stored value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl KvError {
    pub fn invalid_value(key: &str, message: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for key-value operations.
pub type Result<T> = std::result::Result<T, KvError>;

/// An atomically-updatable string store with optional per-entry expiry.
///
/// `put` replaces any existing value in a single operation; readers never
/// observe a partially written entry. Expired entries read as absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value, optionally expiring after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Store a value only if the key is absent or expired.
    ///
    /// Returns `true` when this call wrote the value. Two callers racing on
    /// the same key never both see `true`.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| KvError::invalid_value(key, e)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| KvError::invalid_value(key, e))?;
    store.put(key, &raw, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        code: i64,
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_store() {
        let store = MemoryStore::new();
        put_json(&store, "marker", &Marker { code: 17 }, None)
            .await
            .expect("put");

        let loaded: Option<Marker> = get_json(&store, "marker").await.expect("get");
        assert_eq!(loaded, Some(Marker { code: 17 }));

        let missing: Option<Marker> = get_json(&store, "absent").await.expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn put_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("claim", "first", None).await.unwrap());
        assert!(!store.put_if_absent("claim", "second", None).await.unwrap());
        assert_eq!(store.get("claim").await.unwrap(), Some("first".to_string()));

        store.delete("claim").await.unwrap();
        assert!(store.put_if_absent("claim", "third", None).await.unwrap());
    }

    #[tokio::test]
    async fn get_json_reports_invalid_values() {
        let store = MemoryStore::new();
        store.put("marker", "not json", None).await.expect("put");

        let err = get_json::<Marker>(&store, "marker")
            .await
            .expect_err("invalid json should error");
        assert!(matches!(err, KvError::InvalidValue { ref key, .. } if key == "marker"));
    }
}
