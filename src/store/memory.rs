//! In-memory counter store implementation.
//!
//! Volatile storage for development and testing. Counters expire lazily:
//! reads treat a past-deadline entry as absent and remove it on the spot,
//! matching the semantics of a TTL-backed remote store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{CounterStore, StoreError};

/// A single counter with an optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory counter store.
///
/// Thread-safe using RwLock. All data is lost on process restart.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) counters.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// True when no live counters exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physically remove expired entries. Returns the number removed.
    ///
    /// Reads already treat expired entries as absent; this only reclaims
    /// memory in long-lived processes.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "purged expired counters");
        }
        purged
    }

    fn live_count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.count),
            None => None,
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.count = 0;
            entry.expires_at = None;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.count = 0;
            entry.expires_at = None;
        }
        entry.count += 1;
        // First hit in the window starts the clock; later hits never slide it.
        if entry.count == 1 {
            entry.expires_at = Some(now + ttl);
        }
        Ok(entry.count)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.live_count(key))
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).and_then(|entry| {
            let deadline = entry.expires_at?;
            deadline.checked_duration_since(now)
        }))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().unwrap();
        let mut deleted = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_initializes_to_one() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.increment("a").await.unwrap(), 1);
        assert_eq!(store.increment("a").await.unwrap(), 2);
        assert_eq!(store.increment("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_counter_is_absent() {
        let store = MemoryCounterStore::new();
        store.increment("a").await.unwrap();
        store.expire("a", Duration::ZERO).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        // A fresh increment restarts from 1.
        assert_eq!(store.increment("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compound_sets_ttl_only_on_create() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(3600);

        store.increment_with_expiry("a", ttl).await.unwrap();
        let first = store.ttl_remaining("a").await.unwrap().unwrap();

        // Second hit must not push the deadline forward.
        store.increment_with_expiry("a", Duration::from_secs(7200)).await.unwrap();
        let second = store.ttl_remaining("a").await.unwrap().unwrap();
        assert!(second <= first);
    }

    #[tokio::test]
    async fn test_expire_refreshes_ttl() {
        let store = MemoryCounterStore::new();
        store.increment("a").await.unwrap();
        store.expire("a", Duration::from_secs(10)).await.unwrap();
        store.expire("a", Duration::from_secs(3600)).await.unwrap();

        let remaining = store.ttl_remaining("a").await.unwrap().unwrap();
        assert!(remaining > Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_delete_returns_removed_count() {
        let store = MemoryCounterStore::new();
        store.increment("a").await.unwrap();
        store.increment("b").await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
        assert_eq!(store.delete(&keys).await.unwrap(), 2);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_prefix_skips_expired() {
        let store = MemoryCounterStore::new();
        store.increment("rl:t1:sms:minute").await.unwrap();
        store.increment("rl:t1:sms:hour").await.unwrap();
        store.increment("rl:t2:sms:minute").await.unwrap();
        store.expire("rl:t1:sms:hour", Duration::ZERO).await.unwrap();

        let mut keys = store.scan_prefix("rl:t1:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["rl:t1:sms:minute".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryCounterStore::new();
        store.increment("a").await.unwrap();
        store.increment("b").await.unwrap();
        store.expire("a", Duration::ZERO).await.unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
