//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters of one resource cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    stale_served: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
    invalidated: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Fresh hits served without a fetch.
    pub hits: u64,
    /// Fetches started.
    pub fetches: u64,
    /// Callers that joined an in-flight fetch.
    pub coalesced: u64,
    /// Failed refreshes answered with a previous value.
    pub stale_served: u64,
    /// Failed fetches.
    pub failures: u64,
    /// Late fetch results that were not stored.
    pub discarded: u64,
    /// Entries cleared or marked stale by invalidation.
    pub invalidated: u64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidated(&self, entries: usize) {
        self.invalidated.fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Share of lookups answered from cache (hits and coalesced joins).
    pub fn hit_ratio(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = served + self.fetches;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}
