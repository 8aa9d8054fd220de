//! Ephemeral credential store
//!
//! In-memory `key -> secret` map where every entry deletes itself a fixed
//! time after it was written. A tokio `RwLock` guards the map: reads share
//! the lock, `set`/`delete` and the expiry task take it exclusively.
//!
//! Expiry is a fire-once task spawned by `set`. Each write stamps the entry
//! with a fresh generation number and the task only deletes the entry if
//! the generation still matches, so a timer scheduled for an old value can
//! never remove a newer one written under the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Lifetime of a stored OTP when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60);

/// A live entry. The TTL counts from `created_at`; reads do not extend it.
#[derive(Debug, Clone)]
pub struct CredentialEntry<V> {
    pub value: V,
    pub created_at: Instant,
    generation: u64,
}

struct Inner<V> {
    ttl: Duration,
    next_generation: AtomicU64,
    entries: RwLock<HashMap<String, CredentialEntry<V>>>,
}

impl<V> Inner<V> {
    async fn expire(&self, key: &str, generation: u64) {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.generation == generation => {
                entries.remove(key);
                debug!(key, "credential expired");
            }
            Some(_) => debug!(key, "skipping expiry, entry was replaced"),
            None => {}
        }
    }
}

/// Self-expiring credential map. Cloning shares the same underlying map.
///
/// `set` spawns the expiry task, so it must be called from inside a tokio
/// runtime. Pending expiry tasks hold only a weak reference and end quietly
/// once the last store handle is dropped.
pub struct CredentialStore<V = String> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for CredentialStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> CredentialStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                next_generation: AtomicU64::new(0),
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Insert or replace `key`, restarting its expiry timer.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.inner.entries.write().await;
            entries.insert(
                key.clone(),
                CredentialEntry {
                    value,
                    created_at: Instant::now(),
                    generation,
                },
            );
        }
        debug!(key, ttl_secs = self.inner.ttl.as_secs(), "credential stored");

        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&key, generation).await;
            }
        });
    }

    /// Current value for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.inner.entries.read().await;
        entries.get(key).map(|e| e.value.clone())
    }

    /// Full entry for `key` including its creation time.
    pub async fn entry(&self, key: &str) -> Option<CredentialEntry<V>> {
        let entries = self.inner.entries.read().await;
        entries.get(key).cloned()
    }

    /// Remove `key`. Missing keys are a no-op.
    pub async fn delete(&self, key: &str) -> Option<V> {
        let mut entries = self.inner.entries.write().await;
        let removed = entries.remove(key).map(|e| e.value);
        if removed.is_some() {
            debug!(key, "credential deleted");
        }
        removed
    }

    /// Remove `key` only if its current value equals `expected`.
    ///
    /// Check and removal happen under one write lock, so of two callers
    /// racing on the same value at most one sees `true`.
    pub async fn remove_if_eq(&self, key: &str, expected: &V) -> bool
    where
        V: PartialEq,
    {
        let mut entries = self.inner.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.value == *expected => {
                entries.remove(key);
                debug!(key, "credential consumed");
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V: Clone + Send + Sync + 'static> Default for CredentialStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store: CredentialStore = CredentialStore::default();
        for key in ["validKey", "", "special@Key!"] {
            store.set(key, format!("value-{key}")).await;
            assert_eq!(store.get(key).await, Some(format!("value-{key}")));
        }
        assert_eq!(store.ttl(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn get_missing_key() {
        let store: CredentialStore = CredentialStore::default();
        assert_eq!(store.get("doesnt_exist").await, None);
    }

    #[tokio::test]
    async fn delete_then_get() {
        let store: CredentialStore = CredentialStore::default();
        store.set("key1", "value1".to_string()).await;
        store.set("key2", "value2".to_string()).await;

        assert_eq!(store.delete("key1").await, Some("value1".to_string()));
        assert_eq!(store.get("key1").await, None);
        assert_eq!(store.get("key2").await, Some("value2".to_string()));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store: CredentialStore = CredentialStore::default();
        assert_eq!(store.delete("key3").await, None);

        store.set("key1", "value1".to_string()).await;
        store.delete("key1").await;
        assert_eq!(store.delete("key1").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn set_replaces_existing_value() {
        let store: CredentialStore = CredentialStore::default();
        store.set("user", "1111".to_string()).await;
        store.set("user", "2222".to_string()).await;
        assert_eq!(store.get("user").await, Some("2222".to_string()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let store: CredentialStore = CredentialStore::new(Duration::from_secs(5));
        store.set("k", "v".to_string()).await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await, Some("v".to_string()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_lifetime() {
        let store: CredentialStore = CredentialStore::new(Duration::from_secs(10));
        store.set("k", "v".to_string()).await;
        let created = store.entry("k").await.unwrap().created_at;

        for _ in 0..9 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(store.get("k").await.is_some());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.get("k").await.is_none());
        assert!(Instant::now() - created >= Duration::from_secs(10));
    }

    // The stale timer from the first write must not delete the second write.
    #[tokio::test(start_paused = true)]
    async fn stale_expiry_does_not_remove_replacement() {
        let store: CredentialStore = CredentialStore::new(Duration::from_secs(60));
        store.set("user", "first".to_string()).await;

        tokio::time::sleep(Duration::from_secs(40)).await;
        store.set("user", "second".to_string()).await;

        // First timer fires at t=60
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.get("user").await, Some("second".to_string()));

        // Second timer fires at t=100
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(store.get("user").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_after_explicit_delete_is_harmless() {
        let store: CredentialStore = CredentialStore::new(Duration::from_secs(1));
        store.set("k", "v".to_string()).await;
        store.delete("k").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_if_eq_only_matches_current_value() {
        let store: CredentialStore = CredentialStore::default();
        store.set("user", "1234".to_string()).await;

        assert!(!store.remove_if_eq("user", &"9999".to_string()).await);
        assert!(store.get("user").await.is_some());

        assert!(store.remove_if_eq("user", &"1234".to_string()).await);
        assert!(!store.remove_if_eq("user", &"1234".to_string()).await);
        assert!(store.get("user").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sets_on_distinct_keys_do_not_interfere() {
        let store: CredentialStore = CredentialStore::default();

        let mut handles = vec![];
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("user-{i}");
                for round in 0..20 {
                    let value = format!("{i}:{round}");
                    store.set(key.clone(), value.clone()).await;
                    assert_eq!(store.get(&key).await, Some(value));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len().await, 64);
        for i in 0..64 {
            assert_eq!(
                store.get(&format!("user-{i}")).await,
                Some(format!("{i}:19"))
            );
        }
    }

    #[tokio::test]
    async fn generic_values() {
        let store: CredentialStore<u32> = CredentialStore::default();
        store.set("n", 7).await;
        assert_eq!(store.get("n").await, Some(7));
    }
}
