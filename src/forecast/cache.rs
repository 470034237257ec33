//! Bounded forecast cache keyed by location and forecast hour.
//!
//! Validity lives entirely in the key: once the bucketing clock moves to the
//! next canonical hour, callers build a different key and the old entry is
//! simply never asked for again until LRU pressure pushes it out. There is
//! no TTL.
//!
//! Misses are single-flight per key. Concurrent callers for a missing key
//! wait on the first caller's computation; if that computation is dropped
//! mid-flight, the next waiter runs its own. Failures are never stored.

use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::bucket::BucketId;
use super::types::{Coordinate, ForecastWindow};
use super::ForecastError;

/// Default number of distinct keys kept in memory.
pub const DEFAULT_CAPACITY: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForecastBucketKey {
    pub coordinate: Coordinate,
    pub bucket: BucketId,
}

impl ForecastBucketKey {
    pub fn new(coordinate: Coordinate, bucket: BucketId) -> Self {
        Self { coordinate, bucket }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub capacity: u64,
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ForecastCache {
    entries: Cache<ForecastBucketKey, ForecastWindow>,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl ForecastCache {
    pub fn new(capacity: u64) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let evicted = Arc::clone(&evictions);

        let entries = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<ForecastBucketKey>, _window, cause| {
                if matches!(cause, RemovalCause::Size) {
                    evicted.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(?key, "Evicted least recently used forecast");
                }
            })
            .build();

        Self {
            entries,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Returns the cached window for `key`, running `compute` only when no
    /// entry exists and no other caller is already computing one.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: ForecastBucketKey,
        compute: F,
    ) -> Result<ForecastWindow, ForecastError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ForecastWindow, ForecastError>>,
    {
        let result = self
            .entries
            .entry(key)
            .or_try_insert_with(async move { compute().await })
            .await;

        match result {
            Ok(entry) if entry.is_fresh() => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?key, "Forecast cache miss, stored new window");
                Ok(entry.into_value())
            }
            Ok(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?key, "Forecast cache hit");
                Ok(entry.into_value())
            }
            Err(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?key, "Forecast computation failed, nothing cached: {}", err);
                Err(ForecastError::clone(&err))
            }
        }
    }

    pub fn contains(&self, key: &ForecastBucketKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Applies pending eviction bookkeeping. Counts reported by
    /// [`entry_count`](Self::entry_count) and [`stats`](Self::stats) are
    /// exact only after this has run.
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            entries: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
