//! Read-through resolution with request coalescing and stale-on-error.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures::FutureExt;
use lms_data::{with_timeout, FetchError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::ResourceCache;
use crate::entry::{InFlight, SharedFetch};
use crate::policy::CacheStatus;

/// A resolved value and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// The value.
    pub value: T,
    /// Cache status of the lookup.
    pub status: CacheStatus,
}

enum Lookup<T> {
    Fresh(T),
    Pending { future: SharedFetch<T>, joined: bool },
}

/// Resolve `key` against `cache`, fetching with `fetch` when needed.
///
/// Equivalent to [`ResourceCache::resolve_with_ttl`].
pub async fn resolve<K, T, F, Fut>(
    cache: &ResourceCache<K, T>,
    key: K,
    ttl: Duration,
    fetch: F,
) -> Result<T, FetchError>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: FnOnce(K) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    cache.resolve_with_ttl(key, ttl, fetch).await
}

impl<K, T> ResourceCache<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Resolve `key` using the cache's own TTL.
    pub async fn resolve<F, Fut>(&self, key: K, fetch: F) -> Result<T, FetchError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.resolve_with_ttl(key, self.ttl(), fetch).await
    }

    /// Resolve `key` with an explicit TTL.
    pub async fn resolve_with_ttl<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.resolve_with_status(key, ttl, fetch)
            .await
            .map(|resolved| resolved.value)
    }

    /// Resolve `key` and report how the value was obtained.
    ///
    /// 1. A fresh value is returned without fetching.
    /// 2. Otherwise a fetch already in flight for the key is joined.
    /// 3. Otherwise a new fetch is started and registered as in flight.
    ///
    /// A transient failure is answered with the previous value if one exists
    /// and the policy allows it. Every other failure is returned as is.
    pub async fn resolve_with_status<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        fetch: F,
    ) -> Result<Resolved<T>, FetchError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (future, joined) = match self.lookup(key, ttl, fetch) {
            Lookup::Fresh(value) => {
                return Ok(Resolved {
                    value,
                    status: CacheStatus::Hit,
                })
            }
            Lookup::Pending { future, joined } => (future, joined),
        };

        let mut resolved = future.await?;
        if joined && resolved.status == CacheStatus::Miss {
            resolved.status = CacheStatus::Coalesced;
        }
        Ok(resolved)
    }

    fn lookup<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Lookup<T>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let entry = inner.entries.entry(key.clone()).or_default();

        if entry.is_fresh(ttl, now) {
            if let Some(value) = entry.value() {
                self.stats.record_hit();
                debug!(cache = %self.name(), ?key, "cache hit");
                return Lookup::Fresh(value.clone());
            }
        }

        if let Some(in_flight) = &entry.in_flight {
            self.stats.record_coalesced();
            debug!(cache = %self.name(), ?key, token = in_flight.token, "joining in-flight fetch");
            return Lookup::Pending {
                future: in_flight.future.clone(),
                joined: true,
            };
        }

        inner.next_token += 1;
        let token = inner.next_token;
        let future = self.start_fetch(key.clone(), token, fetch);
        entry.in_flight = Some(InFlight {
            token,
            future: future.clone(),
        });
        self.stats.record_fetch();
        debug!(cache = %self.name(), ?key, token, "starting fetch");

        Lookup::Pending {
            future,
            joined: false,
        }
    }

    fn start_fetch<F, Fut>(&self, key: K, token: u64, fetch: F) -> SharedFetch<T>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let cache = self.downgrade();
        let limit = self.policy().timeout;

        // The fetch itself is created on first poll, outside the cache lock.
        // It only runs while someone awaits it: if every waiter goes away, the
        // next reader of the key joins and drives it.
        async move {
            let outcome = with_timeout(limit, fetch(key.clone())).await;
            match cache.upgrade() {
                Some(cache) => cache.complete_fetch(&key, token, outcome),
                None => outcome.map(|value| Resolved {
                    value,
                    status: CacheStatus::Miss,
                }),
            }
        }
        .boxed()
        .shared()
    }

    /// Record the outcome of fetch `token` and decide what its waiters get.
    ///
    /// The result is stored only if `token` is still the entry's in-flight
    /// marker; a fetch superseded by a write, a timeout or a discarding
    /// invalidation still answers its own waiters.
    fn complete_fetch(
        &self,
        key: &K,
        token: u64,
        outcome: Result<T, FetchError>,
    ) -> Result<Resolved<T>, FetchError> {
        let outcome = match (outcome, &self.missing) {
            (Err(err), Some(empty)) if err.is_not_found() => {
                debug!(cache = %self.name(), ?key, "not found, treating as empty");
                Ok(empty())
            }
            (outcome, _) => outcome,
        };

        let now = Instant::now();
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(key.clone()).or_default();
        let current = entry.in_flight_token() == Some(token);

        match outcome {
            Ok(value) => {
                if current {
                    entry.store(value.clone(), now);
                } else {
                    self.stats.record_discarded();
                    debug!(cache = %self.name(), ?key, token, "discarding superseded fetch result");
                }
                Ok(Resolved {
                    value,
                    status: CacheStatus::Miss,
                })
            }
            Err(err) => {
                if current {
                    entry.in_flight = None;
                }
                self.stats.record_failure();

                if self.policy().stale_on_error && err.is_transient() {
                    if let Some(value) = entry.stale_fallback(now, self.policy().stale_if_error) {
                        self.stats.record_stale_served();
                        warn!(cache = %self.name(), ?key, error = %err, "refresh failed, serving stale value");
                        return Ok(Resolved {
                            value,
                            status: CacheStatus::Stale,
                        });
                    }
                }

                warn!(cache = %self.name(), ?key, error = %err, "fetch failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Fingerprint;
    use crate::policy::CachePolicy;
    use lms_core::LateResultPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        v: u32,
    }

    fn cache(ttl: Duration) -> ResourceCache<Fingerprint, Arc<Record>> {
        ResourceCache::new("records", CachePolicy::new(ttl))
    }

    /// Fetch function that counts calls and takes 100ms.
    fn counting(
        calls: &Arc<AtomicUsize>,
        v: u32,
    ) -> impl FnOnce(Fingerprint) -> futures::future::BoxFuture<'static, Result<Arc<Record>, FetchError>>
    {
        let calls = calls.clone();
        move |_key| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Arc::new(Record { v }))
            }
            .boxed()
        }
    }

    fn failing(
        err: FetchError,
    ) -> impl FnOnce(Fingerprint) -> futures::future::Ready<Result<Arc<Record>, FetchError>> {
        move |_key| futures::future::ready(Err(err))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_skips_fetch() {
        let cache = cache(Duration::from_millis(2000));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::name("x");

        let first = cache.resolve(key.clone(), counting(&calls, 1)).await.unwrap();
        assert_eq!(first.v, 1);

        tokio::time::advance(Duration::from_millis(400)).await;
        let second = cache
            .resolve_with_status(key.clone(), cache.ttl(), counting(&calls, 2))
            .await
            .unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.value.v, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(2000)).await;
        let third = cache.resolve(key, counting(&calls, 3)).await.unwrap();
        assert_eq!(third.v, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::name("y");

        let (a, b, c) = futures::join!(
            cache.resolve_with_status(key.clone(), cache.ttl(), counting(&calls, 1)),
            cache.resolve_with_status(key.clone(), cache.ttl(), counting(&calls, 2)),
            cache.resolve_with_status(key.clone(), cache.ttl(), counting(&calls, 3)),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.value, &b.value));
        assert!(Arc::ptr_eq(&a.value, &c.value));
        assert_eq!(a.status, CacheStatus::Miss);
        assert_eq!(b.status, CacheStatus::Coalesced);
        assert_eq!(cache.stats().coalesced, 2);
        assert!(!cache.is_in_flight(&key));
    }

    fn failing_slowly(
        calls: &Arc<AtomicUsize>,
        err: FetchError,
    ) -> impl FnOnce(Fingerprint) -> futures::future::BoxFuture<'static, Result<Arc<Record>, FetchError>>
    {
        let calls = calls.clone();
        move |_key| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(err)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_callers_share_stale_fallback() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::name("z");
        cache.set(key.clone(), Arc::new(Record { v: 4 }));
        tokio::time::advance(Duration::from_secs(61)).await;

        let err = FetchError::connection("offline");
        let (a, b, c) = futures::join!(
            cache.resolve_with_status(key.clone(), cache.ttl(), failing_slowly(&calls, err.clone())),
            cache.resolve_with_status(key.clone(), cache.ttl(), failing_slowly(&calls, err.clone())),
            cache.resolve_with_status(key.clone(), cache.ttl(), failing_slowly(&calls, err)),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.value, &b.value));
        assert!(Arc::ptr_eq(&a.value, &c.value));
        assert_eq!(a.value.v, 4);
        for resolved in [&a, &b, &c] {
            assert_eq!(resolved.status, CacheStatus::Stale);
        }
        assert!(!cache.is_in_flight(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_callers_share_error() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::name("z");

        let err = FetchError::forbidden("admins only");
        let (a, b, c) = futures::join!(
            cache.resolve(key.clone(), failing_slowly(&calls, err.clone())),
            cache.resolve(key.clone(), failing_slowly(&calls, FetchError::http(500, "other"))),
            cache.resolve(key.clone(), failing_slowly(&calls, FetchError::http(500, "other"))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap_err(), err);
        assert_eq!(b.unwrap_err(), err);
        assert_eq!(c.unwrap_err(), err);
        assert_eq!(cache.peek(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_does_not_keep_cache_alive() {
        let cache = cache(Duration::from_secs(60));
        let entries = Arc::downgrade(&cache.inner);
        let key = Fingerprint::id(3);

        let pending = cache.resolve(key.clone(), |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Arc::new(Record { v: 1 }))
        });
        assert!(tokio::time::timeout(Duration::from_millis(1), pending).await.is_err());
        assert!(cache.is_in_flight(&key));

        drop(cache);
        assert!(entries.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_is_driven_by_next_reader() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::id(3);

        let pending = cache.resolve(key.clone(), counting(&calls, 1));
        assert!(tokio::time::timeout(Duration::from_millis(1), pending).await.is_err());

        let resolved = cache
            .resolve_with_status(key.clone(), cache.ttl(), counting(&calls, 2))
            .await
            .unwrap();
        assert_eq!(resolved.value.v, 1);
        assert_eq!(resolved.status, CacheStatus::Coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_fresh(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_gets_same_result() {
        let cache = cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::name("y");

        let first = tokio::spawn({
            let cache = cache.clone();
            let fetch = counting(&calls, 1);
            let key = key.clone();
            async move { cache.resolve(key, fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_in_flight(&key));

        let second = cache.resolve(key, counting(&calls, 2)).await.unwrap();
        let first = first.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_served_on_transient_failure() {
        let cache = cache(Duration::from_secs(120));
        let key = Fingerprint::id(1);
        cache.set(key.clone(), Arc::new(Record { v: 1 }));

        tokio::time::advance(Duration::from_secs(180)).await;
        let resolved = cache
            .resolve_with_status(key.clone(), cache.ttl(), failing(FetchError::connection("offline")))
            .await
            .unwrap();

        assert_eq!(resolved.status, CacheStatus::Stale);
        assert_eq!(resolved.value.v, 1);
        assert!(!cache.is_in_flight(&key));
        assert_eq!(cache.stats().stale_served, 1);
        // The failure did not refresh the entry.
        assert!(!cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn test_cold_failure_propagates() {
        let cache = cache(Duration::from_secs(120));
        let err = cache
            .resolve(Fingerprint::id(1), failing(FetchError::http(502, "bad gateway")))
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::http(502, "bad gateway"));
        assert!(!cache.is_in_flight(&Fingerprint::id(1)));
        assert_eq!(cache.peek(&Fingerprint::id(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_error_is_never_masked() {
        let cache = cache(Duration::from_secs(120));
        let key = Fingerprint::id(1);
        cache.set(key.clone(), Arc::new(Record { v: 1 }));
        tokio::time::advance(Duration::from_secs(200)).await;

        let err = cache
            .resolve(key.clone(), failing(FetchError::forbidden("admins only")))
            .await
            .unwrap_err();
        assert!(err.is_permission());

        let err = cache
            .resolve(key.clone(), failing(FetchError::not_found("gone")))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cache.peek(&key).map(|r| r.v), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_disabled_by_policy() {
        let cache: ResourceCache<Fingerprint, u32> =
            ResourceCache::new("stats", CachePolicy::new(Duration::from_secs(1)).without_stale_on_error());
        cache.set(Fingerprint::all(), 5);
        tokio::time::advance(Duration::from_secs(2)).await;

        let result = cache
            .resolve(Fingerprint::all(), |_| async { Err(FetchError::connection("down")) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_window_bounds_fallback() {
        let cache: ResourceCache<Fingerprint, u32> = ResourceCache::new(
            "stats",
            CachePolicy::new(Duration::from_secs(60)).with_stale_if_error(Duration::from_secs(120)),
        );
        cache.set(Fingerprint::all(), 5);
        tokio::time::advance(Duration::from_secs(90)).await;

        let stale = cache
            .resolve(Fingerprint::all(), |_| async { Err(FetchError::http(503, "busy")) })
            .await;
        assert_eq!(stale, Ok(5));

        tokio::time::advance(Duration::from_secs(60)).await;
        let expired = cache
            .resolve(Fingerprint::all(), |_| async { Err(FetchError::http(503, "busy")) })
            .await;
        assert_eq!(expired, Err(FetchError::http(503, "busy")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_fetch() {
        let cache: ResourceCache<Fingerprint, u32> = ResourceCache::new(
            "lessons",
            CachePolicy::new(Duration::from_secs(60)).with_timeout(Duration::from_secs(1)),
        );
        let key = Fingerprint::id(4);

        let err = cache
            .resolve(key.clone(), |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(1)));
        assert!(!cache.is_in_flight(&key));

        // With a previous value the timeout degrades to stale.
        cache.set(key.clone(), 7);
        tokio::time::advance(Duration::from_secs(61)).await;
        let value = cache
            .resolve(key.clone(), |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(1)
            })
            .await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_missing_as_empty() {
        let cache: ResourceCache<Fingerprint, Vec<u32>> =
            ResourceCache::new("quizzes", CachePolicy::default()).with_missing_as_default();

        let value = cache
            .resolve(Fingerprint::all(), |_| async { Err(FetchError::not_found("no endpoint")) })
            .await
            .unwrap();
        assert!(value.is_empty());
        assert!(cache.is_fresh(&Fingerprint::all()));
    }

    #[tokio::test]
    async fn test_invalidated_mid_flight_still_stored_by_default() {
        let cache: ResourceCache<Fingerprint, u32> = ResourceCache::new("enrollments", CachePolicy::default());
        let key = Fingerprint::id(1);
        let (tx, rx) = oneshot::channel::<u32>();

        let pending = tokio::spawn({
            let cache = cache.clone();
            let key = key.clone();
            async move {
                cache
                    .resolve(key, move |_| async move {
                        rx.await.map_err(|e| FetchError::Request(e.to_string()))
                    })
                    .await
            }
        });
        while !cache.is_in_flight(&key) {
            tokio::task::yield_now().await;
        }

        cache.invalidate(&key);
        tx.send(9).unwrap();
        assert_eq!(pending.await.unwrap(), Ok(9));
        assert!(cache.is_fresh(&key));
        assert_eq!(cache.peek(&key), Some(9));
    }

    #[tokio::test]
    async fn test_invalidated_mid_flight_discarded_when_configured() {
        let cache: ResourceCache<Fingerprint, u32> = ResourceCache::new(
            "enrollments",
            CachePolicy::default().with_late_results(LateResultPolicy::Discard),
        );
        let key = Fingerprint::id(1);
        let (tx, rx) = oneshot::channel::<u32>();

        let pending = tokio::spawn({
            let cache = cache.clone();
            let key = key.clone();
            async move {
                cache
                    .resolve(key, move |_| async move {
                        rx.await.map_err(|e| FetchError::Request(e.to_string()))
                    })
                    .await
            }
        });
        while !cache.is_in_flight(&key) {
            tokio::task::yield_now().await;
        }

        assert!(cache.invalidate(&key));
        assert!(!cache.is_in_flight(&key));
        tx.send(9).unwrap();

        // The original caller still receives its result...
        assert_eq!(pending.await.unwrap(), Ok(9));
        // ...but the cache does not keep it.
        assert!(!cache.is_fresh(&key));
        assert_eq!(cache.peek(&key), None);
        assert_eq!(cache.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_write_supersedes_in_flight_fetch() {
        let cache: ResourceCache<Fingerprint, u32> = ResourceCache::new("users", CachePolicy::default());
        let key = Fingerprint::all();
        let (tx, rx) = oneshot::channel::<u32>();

        let pending = tokio::spawn({
            let cache = cache.clone();
            let key = key.clone();
            async move {
                cache
                    .resolve(key, move |_| async move {
                        rx.await.map_err(|e| FetchError::Request(e.to_string()))
                    })
                    .await
            }
        });
        while !cache.is_in_flight(&key) {
            tokio::task::yield_now().await;
        }

        cache.set(key.clone(), 2);
        tx.send(1).unwrap();
        assert_eq!(pending.await.unwrap(), Ok(1));
        assert_eq!(cache.peek(&key), Some(2));
    }

    #[tokio::test]
    async fn test_free_function() {
        let cache: ResourceCache<Fingerprint, &'static str> = ResourceCache::new("stats", CachePolicy::default());
        let value = resolve(&cache, Fingerprint::all(), Duration::from_secs(1), |_| async {
            Ok("ok")
        })
        .await;
        assert_eq!(value, Ok("ok"));
    }
}
