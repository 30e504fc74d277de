use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{KeyValueStore, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process key-value store.
///
/// Clones share the same map. Only suitable when every worker runs in one
/// process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("a", "1", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        store.put("a", "2", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.len(), 1);

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.delete("a").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .put("short", "x", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("short").await.unwrap(), Some("x".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn put_if_absent_reclaims_expired_keys() {
        let store = MemoryStore::new();
        let ttl = Some(Duration::from_secs(10));
        assert!(store.put_if_absent("claim", "a", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!store.put_if_absent("claim", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.put_if_absent("claim", "c", ttl).await.unwrap());
        assert_eq!(store.get("claim").await.unwrap(), Some("c".to_string()));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("k", "v", None).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some("v".to_string()));
    }
}
