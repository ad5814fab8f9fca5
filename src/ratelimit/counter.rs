//! Counter storage behind the rate limiter.
//!
//! Window counters are shared mutable state across every request handler,
//! modeled as a key-value store with atomic increment-and-expire. The
//! trait keeps the limiter agnostic of the backing store, so a
//! process-external store can replace the in-memory one for multi-node
//! deployments without touching the window logic.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::epoch_ms;

/// Sweep dead windows once per this many increments.
const PURGE_EVERY_OPS: u64 = 1024;

/// Atomic increment-and-expire over counter keys.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one and return the post-increment count.
    ///
    /// The first increment of a key arms its expiry `ttl_secs` from now;
    /// an expired key counts as absent and restarts at 1.
    async fn incr(&self, key: &str, ttl_secs: u64) -> u64;
}

struct CounterEntry {
    count: u64,
    expires_at_ms: u64,
}

/// In-process `CounterStore` over a thread-safe DashMap.
///
/// Entries self-expire: incrementing an expired entry resets it, and a
/// periodic sweep drops entries whose window has passed.
pub struct MemoryCounterStore {
    store: DashMap<String, CounterEntry>,
    ops: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
            ops: AtomicU64::new(0),
        }
    }

    /// Number of live (non-expired) counters.
    pub fn len(&self) -> usize {
        let now_ms = epoch_ms();
        self.store
            .iter()
            .filter(|entry| entry.expires_at_ms > now_ms)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl_secs: u64) -> u64 {
        let now_ms = epoch_ms();

        // Fixed windows never revisit an old key, so expired entries are
        // garbage; sweep them occasionally instead of on every call.
        if self.ops.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY_OPS == 0 {
            self.store.retain(|_, entry| entry.expires_at_ms > now_ms);
        }

        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                count: 0,
                expires_at_ms: now_ms + ttl_secs * 1000,
            });
        if entry.expires_at_ms <= now_ms {
            // Same as a store with real TTLs: the key is gone, INCR
            // recreates it.
            *entry.value_mut() = CounterEntry {
                count: 0,
                expires_at_ms: now_ms + ttl_secs * 1000,
            };
        }
        entry.count += 1;
        entry.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_incr_counts_up() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.incr("k", 60).await, 1);
        assert_eq!(store.incr("k", 60).await, 2);
        assert_eq!(store.incr("k", 60).await, 3);
    }

    #[tokio::test]
    async fn test_independent_keys() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.incr("a", 60).await, 1);
        assert_eq!(store.incr("b", 60).await, 1);
        assert_eq!(store.incr("a", 60).await, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_restarts_at_one() {
        let store = MemoryCounterStore::new();
        // ttl of zero expires the entry immediately.
        assert_eq!(store.incr("k", 0).await, 1);
        assert_eq!(store.incr("k", 0).await, 1);
        assert_eq!(store.incr("k", 0).await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_not_counted() {
        let store = MemoryCounterStore::new();
        store.incr("dead", 0).await;
        store.incr("live", 60).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_never_loses_counts() {
        let store = Arc::new(MemoryCounterStore::new());

        let mut handles = vec![];
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.incr("shared", 60).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // One more increment observes every prior one.
        assert_eq!(store.incr("shared", 60).await, 1001);
    }
}
