//! Keyed collection of cache entries for one resource type.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use lms_core::{LateResultPolicy, ResourceKind};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::entry::CacheEntry;
use crate::policy::CachePolicy;
use crate::stats::{CacheStats, CacheStatsSnapshot};

pub(crate) struct CacheInner<K, T> {
    pub(crate) entries: HashMap<K, CacheEntry<T>>,
    pub(crate) next_token: u64,
}

type EmptyFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// One cache per resource type, holding one entry per fingerprint.
///
/// Cloning yields another handle to the same cache. Entries of different keys
/// are independent: nothing done to one key touches another.
pub struct ResourceCache<K, T> {
    name: Arc<str>,
    policy: Arc<CachePolicy>,
    pub(crate) inner: Arc<Mutex<CacheInner<K, T>>>,
    pub(crate) stats: Arc<CacheStats>,
    pub(crate) missing: Option<EmptyFactory<T>>,
}

impl<K, T> Clone for ResourceCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policy: self.policy.clone(),
            inner: self.inner.clone(),
            stats: self.stats.clone(),
            missing: self.missing.clone(),
        }
    }
}

/// Handle to a cache that does not keep its entries alive.
///
/// In-flight fetches are stored inside the entries they complete, so they
/// refer back to the cache through this.
pub(crate) struct WeakResourceCache<K, T> {
    name: Arc<str>,
    policy: Arc<CachePolicy>,
    inner: Weak<Mutex<CacheInner<K, T>>>,
    stats: Arc<CacheStats>,
    missing: Option<EmptyFactory<T>>,
}

impl<K, T> WeakResourceCache<K, T> {
    pub(crate) fn upgrade(&self) -> Option<ResourceCache<K, T>> {
        Some(ResourceCache {
            name: self.name.clone(),
            policy: self.policy.clone(),
            inner: self.inner.upgrade()?,
            stats: self.stats.clone(),
            missing: self.missing.clone(),
        })
    }
}

impl<K, T> fmt::Debug for ResourceCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("entries", &self.inner.lock().entries.len())
            .finish()
    }
}

impl<K, T> ResourceCache<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new(name: impl Into<String>, policy: CachePolicy) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            policy: Arc::new(policy),
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_token: 0,
            })),
            stats: Arc::new(CacheStats::default()),
            missing: None,
        }
    }

    /// Create an empty cache with a resource kind's default policy.
    pub fn for_kind(kind: ResourceKind) -> Self {
        Self::new(kind.name(), CachePolicy::for_kind(kind))
    }

    /// Treat a not-found fetch as a successful fetch of `empty()`.
    pub fn with_missing_as_empty<F>(mut self, empty: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.missing = Some(Arc::new(empty));
        self
    }

    /// Treat a not-found fetch as `T::default()`.
    pub fn with_missing_as_default(self) -> Self
    where
        T: Default,
    {
        self.with_missing_as_empty(T::default)
    }

    pub(crate) fn downgrade(&self) -> WeakResourceCache<K, T> {
        WeakResourceCache {
            name: self.name.clone(),
            policy: self.policy.clone(),
            inner: Arc::downgrade(&self.inner),
            stats: self.stats.clone(),
            missing: self.missing.clone(),
        }
    }

    /// Cache name (used in logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache policy.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// The freshness window.
    pub fn ttl(&self) -> Duration {
        self.policy.ttl
    }

    /// Copy the current counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get the entry for `key`, creating an empty one if absent.
    pub fn get(&self, key: &K) -> CacheEntry<T> {
        self.inner
            .lock()
            .entries
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Check if `key` holds a value younger than the TTL that was not invalidated.
    pub fn is_fresh(&self, key: &K) -> bool {
        self.is_fresh_within(key, self.policy.ttl)
    }

    /// Same as [`is_fresh`](Self::is_fresh) with an explicit TTL.
    pub fn is_fresh_within(&self, key: &K, ttl: Duration) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(ttl, now))
    }

    /// The last good value for `key`, fresh or not.
    pub fn peek(&self, key: &K) -> Option<T> {
        self.inner
            .lock()
            .entries
            .get(key)
            .and_then(|entry| entry.value().cloned())
    }

    /// Check if a fetch is in flight for `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(CacheEntry::is_in_flight)
    }

    /// Store `value` for `key` as freshly fetched.
    ///
    /// Any fetch in flight for the key is detached: its result still reaches
    /// its waiters but is not stored.
    pub fn set(&self, key: K, value: T) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.entries.entry(key).or_default().store(value, now);
    }

    /// Mutate the cached value for `key` in place. Returns `false` if there is
    /// no value to mutate.
    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        self.inner
            .lock()
            .entries
            .get_mut(key)
            .is_some_and(|entry| entry.modify(f))
    }

    /// Like [`update`](Self::update), returning the entry's revision after the
    /// change, or `None` if there is no value to mutate.
    pub fn update_tracked<F>(&self, key: &K, f: F) -> Option<u64>
    where
        F: FnOnce(&mut T),
    {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(key)?;
        entry.modify(f).then(|| entry.revision())
    }

    /// Put `value` back for `key` only if the entry is still at `revision`,
    /// i.e. nothing fetched, wrote or cleared it since. Returns `true` if
    /// `value` was written.
    pub fn restore_if_unchanged(&self, key: &K, revision: u64, value: T) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.revision() == revision => entry.modify(|current| *current = value),
            _ => false,
        }
    }

    /// Clear the value for `key`, forcing the next read to fetch.
    ///
    /// Under [`LateResultPolicy::Discard`] this also detaches any in-flight
    /// fetch. Returns `true` if anything changed.
    pub fn invalidate(&self, key: &K) -> bool {
        let discard = self.policy.late_results == LateResultPolicy::Discard;
        let changed = {
            let mut inner = self.inner.lock();
            match inner.entries.get_mut(key) {
                Some(entry) => {
                    let cleared = entry.clear();
                    let detached = discard && entry.detach_in_flight();
                    cleared || detached
                }
                None => false,
            }
        };

        if changed {
            self.stats.record_invalidated(1);
            debug!(cache = %self.name, ?key, "invalidated entry");
        }
        changed
    }

    /// Clear every entry. Returns the number of entries that changed.
    pub fn invalidate_all(&self) -> usize {
        let discard = self.policy.late_results == LateResultPolicy::Discard;
        let changed = {
            let mut inner = self.inner.lock();
            inner
                .entries
                .values_mut()
                .map(|entry| {
                    let cleared = entry.clear();
                    let detached = discard && entry.detach_in_flight();
                    cleared || detached
                })
                .filter(|changed| *changed)
                .count()
        };

        if changed > 0 {
            self.stats.record_invalidated(changed);
            debug!(cache = %self.name, entries = changed, "invalidated all entries");
        }
        changed
    }

    /// Drop freshness for `key` but keep the value as a stale fallback.
    pub fn mark_stale(&self, key: &K) -> bool {
        let changed = self
            .inner
            .lock()
            .entries
            .get_mut(key)
            .is_some_and(CacheEntry::mark_stale);

        if changed {
            self.stats.record_invalidated(1);
            debug!(cache = %self.name, ?key, "marked entry stale");
        }
        changed
    }

    /// Mark every entry stale. Returns the number of entries that changed.
    pub fn mark_all_stale(&self) -> usize {
        let changed = self
            .inner
            .lock()
            .entries
            .values_mut()
            .map(CacheEntry::mark_stale)
            .filter(|changed| *changed)
            .count();

        if changed > 0 {
            self.stats.record_invalidated(changed);
            debug!(cache = %self.name, entries = changed, "marked all entries stale");
        }
        changed
    }

    /// Number of entries (including empty ones).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently holding a value.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.has_value())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
