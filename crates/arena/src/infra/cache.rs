//! Ephemeral Cache: TTL-keyed key/value store backing invoices, webhook
//! idempotency markers, active attempt handles, sessions, CSRF tokens and rate
//! limit counters.
//!
//! Generalized from the teacher's `AppState.forgot_password_challenges:
//! Arc<RwLock<HashMap<String, (String, Instant)>>>` field into a standalone
//! component with a pluggable backing store. `InProcessCache` bounds memory with
//! `lru::LruCache` and is swept on an interval, following the same
//! `tokio::select!`-between-sleep-and-cancellation shape as the teacher's
//! `InvoiceWatcher`/`PayoutWatcher`.

use async_trait::async_trait;
use log::{debug, info};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: OffsetDateTime,
}

impl Entry {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Ephemeral Cache operations (spec.md §4.2). Implementations must make `del`
/// and `set_if_not_exists` atomic with respect to concurrent callers on the same
/// key — these are the race-winner primitives the payment pipeline and webhook
/// idempotency rely on.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    /// Returns true iff the key existed (and was removed) at delete time.
    async fn del(&self, key: &str) -> bool;
    /// Atomic set-only-if-absent. Returns true iff newly created.
    async fn set_if_not_exists(&self, key: &str, ttl: Duration) -> bool;
    async fn len(&self) -> usize;
}

pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100_000;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// In-process, capacity-bounded `Cache` with LRU eviction. Acceptable as the
/// shipped backing store per SPEC_FULL.md §4.2 (a remote-backed implementation is
/// a drop-in behind the same trait; `REDIS_URL` is validated at startup but not
/// wired to a client in this implementation, recorded as an open-question
/// resolution in DESIGN.md).
pub struct InProcessCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl InProcessCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Removes all expired entries. Returns the count removed.
    fn sweep_once(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        expired.len()
    }
}

#[async_trait]
impl Cache for InProcessCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.put(key.to_string(), Entry { value, expires_at });
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    async fn del(&self, key: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        match guard.pop(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    async fn set_if_not_exists(&self, key: &str, ttl: Duration) -> bool {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        if let Some(existing) = guard.get(key) {
            if !existing.is_expired(now) {
                return false;
            }
        }
        guard.put(
            key.to_string(),
            Entry {
                value: Vec::new(),
                expires_at: now + ttl,
            },
        );
        true
    }

    async fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }
}

/// Background sweep task. Registered on the shared `TaskTracker` alongside the
/// tournament engine's ticks so it is joined during graceful shutdown.
pub struct CacheSweeper {
    cache: std::sync::Arc<InProcessCache>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl CacheSweeper {
    pub fn new(
        cache: std::sync::Arc<InProcessCache>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            cache,
            interval,
            cancel_token,
        }
    }

    pub async fn run(self) {
        info!("Starting cache sweep task");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let removed = self.cache.sweep_once();
                    if removed > 0 {
                        debug!("cache sweep removed {removed} expired entries");
                    }
                }
                _ = self.cancel_token.cancelled() => {
                    info!("Cache sweep task received cancellation");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InProcessCache::new(10);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = InProcessCache::new(10);
        cache
            .set("k", b"v".to_vec(), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn del_returns_true_only_once() {
        let cache = InProcessCache::new(10);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert!(cache.del("k").await);
        assert!(!cache.del("k").await);
    }

    #[tokio::test]
    async fn set_if_not_exists_is_exclusive() {
        let cache = InProcessCache::new(10);
        assert!(cache.set_if_not_exists("k", Duration::from_secs(60)).await);
        assert!(!cache.set_if_not_exists("k", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn lru_eviction_bounds_capacity() {
        let cache = InProcessCache::new(2);
        cache.set("a", vec![1], Duration::from_secs(60)).await;
        cache.set("b", vec![2], Duration::from_secs(60)).await;
        cache.set("c", vec![3], Duration::from_secs(60)).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let cache = InProcessCache::new(10);
        cache.set("live", vec![1], Duration::from_secs(60)).await;
        cache.set("dead", vec![2], Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = cache.sweep_once();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }
}
