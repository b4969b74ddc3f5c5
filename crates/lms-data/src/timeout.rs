//! Timeout wrapper for fetch operations.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Run `fut` within `limit`, mapping expiry to [`FetchError::Timeout`].
///
/// The wrapped future is dropped on expiry, so a late result can never be
/// observed. `None` means no limit.
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, FetchError>
where
    Fut: Future<Output = Result<T, FetchError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(FetchError::Timeout(limit))),
        None => fut.await,
    }
}
