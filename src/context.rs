use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::entry::CacheEntry;
use crate::host::HostId;
use crate::lru::LruCache;
use crate::scheduler::SchedulerRegistry;
use crate::swr::Binding;

/// Default capacity of the shared result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

static GLOBAL: Lazy<SwrContext> = Lazy::new(SwrContext::new);

/// Shared runtime state behind every binding: the result cache, the per-host
/// refresh schedulers and the per-host binding tables.
///
/// The result cache is shared by every controller regardless of owner and
/// keyed purely by fetch key; entries outlive any single controller. The
/// per-host tables are exclusively owned by their host and torn down through
/// [`clear_host`](Self::clear_host).
///
/// Cloning is cheap and shares the same state. Tests construct their own
/// context for isolation; applications typically use
/// [`global`](Self::global).
#[derive(Clone)]
pub struct SwrContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    results: Mutex<LruCache<String, CacheEntry>>,
    schedulers: SchedulerRegistry,
    bindings: Mutex<HashMap<(HostId, String), Box<dyn Binding>>>,
}

impl SwrContext {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a context whose result cache holds at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        SwrContext {
            inner: Arc::new(ContextInner {
                results: Mutex::new(LruCache::new(capacity)),
                schedulers: SchedulerRegistry::new(),
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide context, created on first use.
    pub fn global() -> SwrContext {
        GLOBAL.clone()
    }

    /// Look up the settled entry for `key`, promoting it in the shared
    /// cache's recency order.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.results.lock().unwrap().get(key).cloned()
    }

    /// Store a settled entry under `key`, evicting the least-recently-used
    /// entry if the cache is full.
    pub(crate) fn store(&self, key: String, entry: CacheEntry) {
        self.inner.results.lock().unwrap().set(key, entry);
    }

    pub(crate) fn schedulers(&self) -> &SchedulerRegistry {
        &self.inner.schedulers
    }

    /// Refresh timer period for `host`, `None` when no timer runs.
    pub fn refresh_period(&self, host: HostId) -> Option<i64> {
        self.inner.schedulers.period(host)
    }

    /// Fetch or create the binding cached for `(host, key)`.
    pub(crate) fn binding<T>(&self, host: HostId, key: &str, create: impl FnOnce() -> T) -> T
    where
        T: Binding + Clone + 'static,
    {
        let mut bindings = self.inner.bindings.lock().unwrap();

        if let Some(existing) = bindings.get(&(host, key.to_string())) {
            if let Some(existing) = existing.as_any().downcast_ref::<T>() {
                return existing.clone();
            }
        }

        let created = create();
        bindings.insert((host, key.to_string()), Box::new(created.clone()));
        created
    }

    /// Tear down everything owned on behalf of `host`: cancel its bindings'
    /// in-flight fetches, drop the binding table and stop its refresh timer.
    ///
    /// The shared result cache is untouched; it is not owned by any host.
    pub fn clear_host(&self, host: HostId) {
        let removed: Vec<Box<dyn Binding>> = {
            let mut bindings = self.inner.bindings.lock().unwrap();
            let keys: Vec<_> = bindings
                .keys()
                .filter(|(h, _)| *h == host)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| bindings.remove(&key))
                .collect()
        };

        for binding in removed {
            binding.host_disconnected();
        }
        self.inner.schedulers.disconnect(host);
    }
}

impl Default for SwrContext {
    fn default() -> Self {
        Self::new()
    }
}
