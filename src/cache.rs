//! Per-entity result cache
//!
//! Each entity has its own slot holding the last computed result and the
//! instant it was fetched. Reads never wait on an in-flight refresh; refreshes
//! of one key are serialized and callers that queued behind a refresh reuse
//! its result instead of fetching again. A forced refresh bypasses freshness
//! for its own key only. Failures are cached too, for a shorter window.

use crate::error::ScorecardError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default staleness window
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(300);

/// Default window during which a failed fetch is served from cache
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(15);

/// How a cached lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from a fresh entry
    Hit,
    /// This caller fetched upstream
    Refreshed,
    /// Another caller's concurrent refresh was reused
    Coalesced,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    /// Failures are kept as their message
    result: Result<T, String>,
    fetched_at: Instant,
}

#[derive(Debug)]
struct Slot<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
    refresh: tokio::sync::Mutex<()>,
    /// Bumped on every store
    generation: AtomicU64,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            entry: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn read(&self) -> Option<CacheEntry<T>> {
        self.entry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, result: Result<T, String>) {
        let mut entry = self
            .entry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *entry = Some(CacheEntry {
            result,
            fetched_at: Instant::now(),
        });
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Staleness-bounded cache keyed by entity id
#[derive(Debug)]
pub struct HealthCache<T> {
    staleness: Duration,
    failure_ttl: Duration,
    slots: Mutex<HashMap<String, Arc<Slot<T>>>>,
}

impl<T: Clone> Default for HealthCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS)
    }
}

impl<T: Clone> HealthCache<T> {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            failure_ttl: DEFAULT_FAILURE_TTL.min(staleness),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Set how long a failure stays cached; capped at the staleness window
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl.min(self.staleness);
        self
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    fn slot(&self, key: &str) -> Arc<Slot<T>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        let window = if entry.result.is_ok() {
            self.staleness
        } else {
            self.failure_ttl
        };
        entry.fetched_at.elapsed() < window
    }

    /// Latest result for a key regardless of age, without waiting
    pub fn peek(&self, key: &str) -> Option<Result<T, ScorecardError>> {
        let entry = self.slot(key).read()?;
        Some(restore(key, entry.result))
    }

    /// Fresh result for a key, if any
    pub fn get_fresh(&self, key: &str) -> Option<Result<T, ScorecardError>> {
        let entry = self.slot(key).read()?;
        if self.is_fresh(&entry) {
            Some(restore(key, entry.result))
        } else {
            None
        }
    }

    /// Return a fresh entry or run `fetch` to replace it.
    ///
    /// Concurrent callers for the same key share one `fetch`. With `force`,
    /// freshness is ignored but a refresh that completes while waiting for
    /// the key is still reused.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &str,
        force: bool,
        fetch: F,
    ) -> (Result<T, ScorecardError>, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ScorecardError>>,
    {
        let slot = self.slot(key);
        let seen = slot.generation.load(Ordering::SeqCst);

        if !force {
            if let Some(entry) = slot.read().filter(|e| self.is_fresh(e)) {
                debug!(entity = key, "cache hit");
                return (restore(key, entry.result), CacheStatus::Hit);
            }
        }

        let _guard = slot.refresh.lock().await;

        if slot.generation.load(Ordering::SeqCst) != seen {
            if let Some(entry) = slot.read() {
                debug!(entity = key, "reusing concurrent refresh");
                return (restore(key, entry.result), CacheStatus::Coalesced);
            }
        }

        debug!(entity = key, force, "refreshing");
        let result = fetch().await;
        slot.store(match &result {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(e.to_string()),
        });
        (result, CacheStatus::Refreshed)
    }

    /// Drop one key's entry
    pub fn invalidate(&self, key: &str) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.remove(key);
    }

    /// Number of keys holding a result
    pub fn len(&self) -> usize {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.values().filter(|s| s.read().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn restore<T>(key: &str, result: Result<T, String>) -> Result<T, ScorecardError> {
    result.map_err(|reason| ScorecardError::upstream(key, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    async fn counted(counter: &AtomicUsize, value: u32) -> Result<u32, ScorecardError> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_staleness_window() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let (first, status) = cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        assert_eq!(first.unwrap(), 1);
        assert_eq!(status, CacheStatus::Refreshed);

        let (second, status) = cache.get_or_refresh("a", false, || counted(&calls, 2)).await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_after_staleness() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_fresh("a").is_none());
        assert!(cache.peek("a").is_some());

        let (value, status) = cache.get_or_refresh("a", false, || counted(&calls, 2)).await;
        assert_eq!(value.unwrap(), 2);
        assert_eq!(status, CacheStatus::Refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_bypasses_only_its_key() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        cache.get_or_refresh("b", false, || counted(&calls, 10)).await;

        let (value, status) = cache.get_or_refresh("a", true, || counted(&calls, 2)).await;
        assert_eq!(value.unwrap(), 2);
        assert_eq!(status, CacheStatus::Refreshed);

        let (other, status) = cache.get_or_refresh("b", false, || counted(&calls, 11)).await;
        assert_eq!(other.unwrap(), 10);
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_coalesce() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            cache.get_or_refresh("a", false, || counted(&calls, 1)),
            cache.get_or_refresh("a", false, || counted(&calls, 2)),
            cache.get_or_refresh("a", true, || counted(&calls, 3)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.0.unwrap(), 1);
        assert_eq!(b.0.unwrap(), 1);
        assert_eq!(c.0.unwrap(), 1);
        assert_eq!(b.1, CacheStatus::Coalesced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_during_refresh_see_previous_value() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        cache.get_or_refresh("a", false, || counted(&calls, 1)).await;

        let refresh = cache.get_or_refresh("a", true, || counted(&calls, 2));
        let read = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.peek("a").map(|r| r.unwrap())
        };
        let ((refreshed, _), seen) = tokio::join!(refresh, read);
        assert_eq!(seen, Some(1));
        assert_eq!(refreshed.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_cached_as_upstream_errors() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let (result, _) = cache
            .get_or_refresh("a", false, || async {
                Err(ScorecardError::upstream("a", "board unreachable"))
            })
            .await;
        assert!(result.is_err());

        let cached = cache.get_fresh("a").unwrap().unwrap_err();
        assert!(matches!(cached, ScorecardError::UpstreamFetch { .. }));
        assert!(cached.to_string().contains("board unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_expire_before_successes() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        cache
            .get_or_refresh("a", false, || async {
                Err(ScorecardError::upstream("a", "lists endpoint returned 503"))
            })
            .await;

        tokio::time::advance(DEFAULT_FAILURE_TTL - Duration::from_secs(1)).await;
        let (cached, status) = cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        assert!(cached.is_err());
        assert_eq!(status, CacheStatus::Hit);

        tokio::time::advance(Duration::from_secs(2)).await;
        let (value, status) = cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        assert_eq!(value.unwrap(), 1);
        assert_eq!(status, CacheStatus::Refreshed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate() {
        let cache: HealthCache<u32> = HealthCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        cache.get_or_refresh("a", false, || counted(&calls, 1)).await;
        assert_eq!(cache.len(), 1);
        cache.invalidate("a");
        assert!(cache.is_empty());
        assert!(cache.peek("a").is_none());
    }
}
