// src/cache.rs
//! Process-wide snapshot cache with a freshness window and single-flight refresh.
//!
//! The refresh runs while the slot lock is held, so concurrent misses wait for
//! the first refresh and then read its result instead of refetching.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

struct Entry<T> {
    at: Instant,
    value: Arc<T>,
}

pub struct SnapshotCache<T> {
    ttl: Duration,
    slot: Mutex<Option<Entry<T>>>,
    /// Bumped after every refresh.
    generation: AtomicU64,
}

impl<T: Send + Sync> SnapshotCache<T> {
    /// A zero `ttl` disables caching: every call refreshes.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Return the cached value if younger than the TTL, else run `refresh`
    /// and store its result. `force` skips the freshness check.
    pub async fn get_or_refresh<F, Fut>(&self, force: bool, refresh: F) -> (Arc<T>, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let seen_generation = self.generation.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            let fresh = !self.ttl.is_zero() && entry.at.elapsed() < self.ttl;
            // A refresh that finished while we waited satisfies this request too,
            // unless caching is off.
            let refreshed_while_waiting = !self.ttl.is_zero()
                && self.generation.load(Ordering::Acquire) != seen_generation;
            if (fresh && !force) || refreshed_while_waiting {
                return (entry.value.clone(), CacheStatus::Hit);
            }
        }

        let value = Arc::new(refresh().await);
        *slot = Some(Entry {
            at: Instant::now(),
            value: value.clone(),
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
        (value, CacheStatus::Miss)
    }
}
