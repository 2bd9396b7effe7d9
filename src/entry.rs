use std::any::Any;
use std::sync::Arc;

use crate::error::FetchError;

/// A settled fetch outcome shared across controllers through the result
/// cache.
///
/// Entries are replaced wholesale on each settlement, never merged. `data`
/// and `error` are mutually exclusive: whichever is present describes the
/// settled outcome, stamped with the settlement time.
///
/// Values are stored type-erased (`Arc<dyn Any>`) so a single cache serves
/// controllers of any value type; cloning is a reference-count bump.
/// Consumers recover the typed value by downcast.
#[derive(Clone)]
pub struct CacheEntry {
    data: Option<Arc<dyn Any + Send + Sync>>,
    error: Option<FetchError>,
    timestamp: i64,
}

/// Typed view of a [`CacheEntry`], produced by [`CacheEntry::typed`].
pub struct TypedEntry<V> {
    pub data: Option<Arc<V>>,
    pub error: Option<FetchError>,
    pub timestamp: i64,
}

impl CacheEntry {
    /// Create an entry from a settlement.
    pub fn new<V>(data: Option<Arc<V>>, error: Option<FetchError>, timestamp: i64) -> Self
    where
        V: Send + Sync + 'static,
    {
        CacheEntry {
            data: data.map(|v| v as Arc<dyn Any + Send + Sync>),
            error,
            timestamp,
        }
    }

    /// Time (ms since epoch) of the settlement that produced this entry.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The settled error, if the attempt failed.
    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Recover the typed view of this entry.
    ///
    /// Returns `None` when a stored value exists but is not a `V`; callers
    /// treat that as a cache miss rather than adopting a foreign value.
    pub fn typed<V>(&self) -> Option<TypedEntry<V>>
    where
        V: Send + Sync + 'static,
    {
        let data = match &self.data {
            Some(value) => Some(Arc::clone(value).downcast::<V>().ok()?),
            None => None,
        };

        Some(TypedEntry {
            data,
            error: self.error.clone(),
            timestamp: self.timestamp,
        })
    }
}
