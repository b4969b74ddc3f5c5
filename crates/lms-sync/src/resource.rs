//! A resource cache bound to its fetcher.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use lms_cache::{CacheStatsSnapshot, ResourceCache, Resolved};
use lms_core::ResourceKind;
use lms_data::{FetchError, Fetcher};

/// One cached resource type: its cache and the fetcher that fills it.
pub struct Resource<K, T> {
    kind: ResourceKind,
    cache: ResourceCache<K, T>,
    fetcher: Arc<dyn Fetcher<K, T>>,
}

impl<K, T> Clone for Resource<K, T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            cache: self.cache.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<K, T> fmt::Debug for Resource<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<K, T> Resource<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Bind `cache` to `fetcher`.
    pub fn new(kind: ResourceKind, cache: ResourceCache<K, T>, fetcher: Arc<dyn Fetcher<K, T>>) -> Self {
        Self {
            kind,
            cache,
            fetcher,
        }
    }

    /// The resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ResourceCache<K, T> {
        &self.cache
    }

    /// Resolve `key` through the cache.
    pub async fn get(&self, key: K) -> Result<T, FetchError> {
        self.get_with_status(key).await.map(|resolved| resolved.value)
    }

    /// Resolve `key` and report the cache status.
    pub async fn get_with_status(&self, key: K) -> Result<Resolved<T>, FetchError> {
        let fetcher = self.fetcher.clone();
        self.cache
            .resolve_with_status(key, self.cache.ttl(), move |key| async move {
                fetcher.fetch(key).await
            })
            .await
    }

    /// Force the next read of `key` to fetch.
    pub fn invalidate(&self, key: &K) -> bool {
        self.cache.invalidate(key)
    }

    /// Force the next read of every key to fetch.
    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_all()
    }

    /// Cache counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_cache::{CacheStatus, Fingerprint};
    use lms_data::fetcher_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_get_through_fetcher() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = fetcher_fn(move |key: Fingerprint| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(vec![key.to_string()])
            }
        });
        let users: Resource<Fingerprint, Vec<String>> = Resource::new(
            ResourceKind::Users,
            ResourceCache::for_kind(ResourceKind::Users),
            Arc::new(fetcher),
        );

        assert_eq!(users.get(Fingerprint::all()).await.unwrap(), vec!["all".to_string()]);
        let again = users.get_with_status(Fingerprint::all()).await.unwrap();
        assert_eq!(again.status, CacheStatus::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(users.invalidate(&Fingerprint::all()));
        users.get(Fingerprint::all()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(users.stats().fetches, 2);
    }
}
