//! The per-resource fetch interface supplied by the transport layer.

use std::future::Future;

use async_trait::async_trait;

use crate::error::FetchError;

/// Fetches one resource by key.
///
/// Implementations must fail on non-2xx responses and resolve with the parsed
/// value otherwise. They may apply their own timeouts; the cache treats those
/// as ordinary failures.
#[async_trait]
pub trait Fetcher<K, T>: Send + Sync
where
    K: Send + 'static,
    T: Send + 'static,
{
    /// Fetch the value for `key`.
    async fn fetch(&self, key: K) -> Result<T, FetchError>;
}

/// Adapter turning an async closure into a [`Fetcher`].
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

#[async_trait]
impl<K, T, F, Fut> Fetcher<K, T> for FnFetcher<F>
where
    K: Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, FetchError>> + Send,
{
    async fn fetch(&self, key: K) -> Result<T, FetchError> {
        (self.f)(key).await
    }
}
