use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// The injectable fetch capability: maps a key to a value.
///
/// Transport, decoding and timeouts are entirely the fetcher's business.
/// Cancellation is cooperative: implementations should observe `cancel` and
/// return [`FetchError::Aborted`] when it fires, but the runtime also races
/// the token itself, so a fetcher that ignores it merely wastes work.
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync {
    async fn fetch(&self, key: &K, cancel: &CancellationToken) -> Result<V, FetchError>;
}

/// Adapter exposing an async closure as a [`Fetcher`].
///
/// Built with [`fetch_fn`].
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap an async closure as a [`Fetcher`].
///
/// # Example
/// ```ignore
/// let fetcher = fetch_fn(|key: String, _cancel| async move {
///     Ok(format!("payload for {}", key))
/// });
/// ```
pub fn fetch_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

#[async_trait]
impl<K, V, F, Fut> Fetcher<K, V> for FnFetcher<F>
where
    K: Clone + Send + Sync,
    V: Send,
    F: Fn(K, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, FetchError>> + Send,
{
    async fn fetch(&self, key: &K, cancel: &CancellationToken) -> Result<V, FetchError> {
        (self.f)(key.clone(), cancel.clone()).await
    }
}
