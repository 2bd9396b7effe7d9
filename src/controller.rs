use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::context::SwrContext;
use crate::entry::CacheEntry;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::host::HostHandle;
use crate::scheduler::RefreshTarget;
use crate::swr::SwrState;
use crate::utils::{now_ms, time_expired};

/// Staleness threshold applied when neither `max_age` nor a positive
/// `refresh_interval` is configured.
pub const DEFAULT_MAX_AGE_MS: i64 = 5000;

/// Fetch lifecycle status.
///
/// `Pending` is only observed before the first settlement; afterwards every
/// attempt settles back into `Fulfilled` or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

/// Binding-time configuration.
#[derive(Debug, Clone, Default)]
pub struct SwrConfig {
    /// Periodic refresh interval in milliseconds. Zero disables periodic
    /// refresh; negative values are clamped to zero.
    pub refresh_interval: i64,

    /// Staleness threshold in milliseconds. Falls back to
    /// `refresh_interval` when that is positive, else to
    /// [`DEFAULT_MAX_AGE_MS`]. Non-positive values count as unset.
    pub max_age: Option<i64>,
}

struct ResolvedConfig {
    refresh_interval: i64,
    max_age: i64,
}

impl SwrConfig {
    fn resolve(self) -> ResolvedConfig {
        let refresh_interval = self.refresh_interval.max(0);
        let max_age = match self.max_age {
            Some(age) if age > 0 => age,
            _ if refresh_interval > 0 => refresh_interval,
            _ => DEFAULT_MAX_AGE_MS,
        };
        ResolvedConfig {
            refresh_interval,
            max_age,
        }
    }
}

struct ControllerState<V> {
    data: Option<Arc<V>>,
    error: Option<FetchError>,
    status: Status,
    timestamp: i64,
    is_loading: bool,
    is_validating: bool,
    cancel: CancellationToken,
}

/// One fetch attempt's handle: the token it runs under and the status it
/// superseded.
struct Attempt {
    cancel: CancellationToken,
    prev_status: Status,
}

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

/// The stale-while-revalidate state machine for one (host, key) pair.
///
/// Owns the key, the fetch capability, the observable fetch state and the
/// in-flight cancellation handle. Reads and writes the context's shared
/// result cache, registers with the host's refresh scheduler while the host
/// is active, and asks the host to re-render whenever observable state
/// changes.
///
/// At most one fetch attempt is in flight per controller; evaluations that
/// arrive while one is outstanding are no-ops, not queued retries.
pub struct SwrController<K, V> {
    id: u64,
    key: K,
    cache_key: String,
    fetcher: Arc<dyn Fetcher<K, V>>,
    config: ResolvedConfig,
    host: HostHandle,
    context: SwrContext,
    state: Mutex<ControllerState<V>>,
}

impl<K, V> SwrController<K, V>
where
    K: Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    /// Create a controller for `key`.
    ///
    /// The cache key is the `Display` rendering of `key`, so keys that
    /// render equally share one cache entry.
    pub fn new(
        context: SwrContext,
        host: HostHandle,
        key: K,
        fetcher: Arc<dyn Fetcher<K, V>>,
        config: SwrConfig,
    ) -> Arc<Self> {
        let cache_key = key.to_string();
        Arc::new(SwrController {
            id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
            key,
            cache_key,
            fetcher,
            config: config.resolve(),
            host,
            context,
            state: Mutex::new(ControllerState {
                data: None,
                error: None,
                status: Status::Pending,
                timestamp: 0,
                is_loading: false,
                is_validating: false,
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The string form of the key used in the shared result cache.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn status(&self) -> Status {
        self.state.lock().unwrap().status
    }

    /// Timestamp (ms) of the last settlement; 0 before the first one.
    pub fn timestamp(&self) -> i64 {
        self.state.lock().unwrap().timestamp
    }

    pub(crate) fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Snapshot of the observable state.
    pub fn current(&self) -> SwrState<V> {
        let state = self.state.lock().unwrap();
        SwrState {
            data: state.data.clone(),
            error: state.error.clone(),
            is_loading: state.is_loading,
            is_validating: state.is_validating,
        }
    }

    /// Mount notification: join the host's refresh schedule.
    ///
    /// Reconnecting after a teardown replaces the consumed cancellation
    /// handle so fetches can run again.
    pub fn host_connected(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.cancel.is_cancelled() {
                state.cancel = CancellationToken::new();
            }
        }
        self.context
            .schedulers()
            .register(self.host.id(), Arc::clone(self) as Arc<dyn RefreshTarget>);
    }

    /// Unmount notification: cancel any in-flight attempt and leave the
    /// refresh schedule. No further fetches start until reconnected.
    pub fn host_disconnected(&self) {
        self.state.lock().unwrap().cancel.cancel();
        self.context.schedulers().unregister(self.host.id(), self.id);
    }

    /// SWR entry point, invoked on every render access and every due
    /// scheduler tick.
    ///
    /// Serves a fresh-enough cached result synchronously; otherwise starts
    /// at most one background fetch and returns without waiting for it.
    pub fn evaluate(self: &Arc<Self>) {
        let Some(attempt) = self.begin_attempt() else {
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_attempt(attempt).await;
        });
    }

    /// Like [`evaluate`](Self::evaluate), but awaits the settlement of any
    /// attempt it starts.
    pub async fn revalidate(self: &Arc<Self>) {
        let Some(attempt) = self.begin_attempt() else {
            return;
        };
        self.run_attempt(attempt).await;
    }

    /// Manually settle with `value`, or with `None` mark the cached result
    /// expired so the next evaluation refetches. Never invokes the fetcher.
    pub fn mutate(&self, value: Option<V>) {
        let mut state = self.state.lock().unwrap();
        let entry = match value {
            Some(value) => {
                state.data = Some(Arc::new(value));
                state.error = None;
                state.status = Status::Fulfilled;
                state.timestamp = now_ms();
                CacheEntry::new(state.data.clone(), None, state.timestamp)
            }
            None => {
                state.timestamp = 0;
                CacheEntry::new(state.data.clone(), state.error.clone(), 0)
            }
        };
        drop(state);

        self.context.store(self.cache_key.clone(), entry);
        self.host.request_update();
    }

    /// Steps 1-3 of an evaluation: dedup guard, cache adoption, attempt
    /// bookkeeping. Returns the attempt to run, or `None` when the current
    /// state already answers.
    fn begin_attempt(&self) -> Option<Attempt> {
        let mut state = self.state.lock().unwrap();

        if state.is_validating {
            return None;
        }

        if let Some(entry) = self.context.entry(&self.cache_key) {
            if !time_expired(entry.timestamp(), self.config.max_age) {
                if let Some(typed) = entry.typed::<V>() {
                    state.data = typed.data;
                    state.error = typed.error;
                    state.timestamp = typed.timestamp;
                    state.status = if state.error.is_some() {
                        Status::Rejected
                    } else {
                        Status::Fulfilled
                    };
                    drop(state);
                    self.host.request_update();
                    return None;
                }
                // A foreign value type under this key counts as a miss.
            }
        }

        // A rejected attempt consumed its cancellation handle.
        if state.status == Status::Rejected {
            state.cancel = CancellationToken::new();
        }

        state.is_loading = state.status == Status::Pending;
        let prev_status = state.status;
        state.status = Status::Pending;
        state.is_validating = true;

        Some(Attempt {
            cancel: state.cancel.clone(),
            prev_status,
        })
    }

    /// Step 4: run the fetcher, racing the cancellation token so teardown
    /// discards promptly even when the fetcher ignores it.
    async fn run_attempt(&self, attempt: Attempt) {
        let result = tokio::select! {
            _ = attempt.cancel.cancelled() => Err(FetchError::aborted(&self.cache_key)),
            result = self.fetcher.fetch(&self.key, &attempt.cancel) => result,
        };
        self.settle(attempt, result);
    }

    /// Steps 4-5: fold the attempt's result into controller state, stamp the
    /// settlement, write the shared cache and ask for a re-render.
    fn settle(&self, attempt: Attempt, result: Result<V, FetchError>) {
        let mut state = self.state.lock().unwrap();

        let aborted = attempt.cancel.is_cancelled()
            || matches!(&result, Err(e) if e.is_aborted());
        if aborted {
            // A superseded attempt must not clobber a later one's result.
            tracing::debug!(key = %self.cache_key, "discarding aborted fetch");
            state.is_validating = false;
            state.is_loading = false;
            return;
        }

        match result {
            Ok(value) => {
                if state.data.as_deref() == Some(&value) {
                    // Unchanged payload: keep the held allocation and the
                    // previously settled status.
                    state.status = attempt.prev_status;
                } else {
                    state.data = Some(Arc::new(value));
                    state.error = None;
                    state.status = Status::Fulfilled;
                }
            }
            Err(error) => {
                tracing::debug!(key = %self.cache_key, %error, "fetch failed");
                state.status = Status::Rejected;
                state.data = None;
                state.error = Some(error);
            }
        }

        state.timestamp = now_ms();
        state.is_validating = false;
        state.is_loading = false;
        let entry = CacheEntry::new(state.data.clone(), state.error.clone(), state.timestamp);
        drop(state);

        self.context.store(self.cache_key.clone(), entry);
        self.host.request_update();
    }
}

impl<K, V> RefreshTarget for SwrController<K, V>
where
    K: Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    fn target_id(&self) -> u64 {
        self.id
    }

    fn refresh_interval(&self) -> i64 {
        self.config.refresh_interval
    }

    fn last_settled_at(&self) -> i64 {
        self.timestamp()
    }

    fn is_connected(&self) -> bool {
        self.host.is_connected()
    }

    fn refresh(self: Arc<Self>) {
        self.evaluate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fetch_fn;
    use crate::host::RenderHost;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct TestHost {
        connected: AtomicBool,
        updates: AtomicUsize,
    }

    impl TestHost {
        fn new() -> Arc<Self> {
            Arc::new(TestHost {
                connected: AtomicBool::new(true),
                updates: AtomicUsize::new(0),
            })
        }
    }

    impl RenderHost for TestHost {
        fn request_update(&self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn resolved(config: SwrConfig) -> (i64, i64) {
        let r = config.resolve();
        (r.refresh_interval, r.max_age)
    }

    #[test]
    fn test_config_defaults() {
        assert_eq!(resolved(SwrConfig::default()), (0, DEFAULT_MAX_AGE_MS));
    }

    #[test]
    fn test_config_max_age_falls_back_to_interval() {
        let config = SwrConfig {
            refresh_interval: 2000,
            max_age: None,
        };
        assert_eq!(resolved(config), (2000, 2000));
    }

    #[test]
    fn test_config_negative_interval_clamped() {
        let config = SwrConfig {
            refresh_interval: -5,
            max_age: None,
        };
        assert_eq!(resolved(config), (0, DEFAULT_MAX_AGE_MS));
    }

    #[test]
    fn test_config_non_positive_max_age_is_unset() {
        let config = SwrConfig {
            refresh_interval: 0,
            max_age: Some(-100),
        };
        assert_eq!(resolved(config), (0, DEFAULT_MAX_AGE_MS));
    }

    #[test]
    fn test_config_explicit_max_age_wins() {
        let config = SwrConfig {
            refresh_interval: 2000,
            max_age: Some(800),
        };
        assert_eq!(resolved(config), (2000, 800));
    }

    #[tokio::test]
    async fn test_first_settlement_transitions_to_fulfilled() {
        let context = SwrContext::new();
        let host = TestHost::new();
        let fetcher = Arc::new(fetch_fn(|_key: String, _cancel| async move {
            Ok("payload".to_string())
        }));

        let controller = SwrController::new(
            context,
            HostHandle::new(host.clone()),
            "item:1".to_string(),
            fetcher,
            SwrConfig::default(),
        );

        assert_eq!(controller.status(), Status::Pending);
        controller.revalidate().await;

        assert_eq!(controller.status(), Status::Fulfilled);
        let state = controller.current();
        assert_eq!(state.data.as_deref(), Some(&"payload".to_string()));
        assert!(state.error.is_none());
        assert!(!state.is_loading);
        assert!(!state.is_validating);
        assert!(host.updates.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_is_loading_only_on_first_attempt() {
        let context = SwrContext::new();
        let controller: Arc<SwrController<String, String>> = SwrController::new(
            context,
            HostHandle::new(TestHost::new()),
            "item:2".to_string(),
            Arc::new(fetch_fn(|_key: String, _cancel| async move {
                Ok("v".to_string())
            })),
            SwrConfig {
                refresh_interval: 0,
                max_age: Some(1),
            },
        );

        // Loading flag is observable while the first attempt is in flight.
        let attempt = controller.begin_attempt().unwrap();
        assert!(controller.current().is_loading);
        controller.run_attempt(attempt).await;
        assert!(!controller.current().is_loading);

        // Later attempts validate without the loading flag.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let attempt = controller.begin_attempt().unwrap();
        assert!(!controller.current().is_loading);
        assert!(controller.current().is_validating);
        controller.run_attempt(attempt).await;
    }

    #[tokio::test]
    async fn test_mutate_settles_without_fetch() {
        let context = SwrContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let controller = SwrController::new(
            context.clone(),
            HostHandle::new(TestHost::new()),
            "item:3".to_string(),
            Arc::new(fetch_fn(move |_key: String, _cancel| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fetched".to_string())
                }
            })),
            SwrConfig::default(),
        );

        controller.mutate(Some("manual".to_string()));
        assert_eq!(controller.status(), Status::Fulfilled);

        // The mutated entry is fresh, so evaluation adopts it.
        controller.revalidate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            controller.current().data.as_deref(),
            Some(&"manual".to_string())
        );

        // Invalidation forces the next evaluation through the fetcher.
        controller.mutate(None);
        controller.revalidate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.current().data.as_deref(),
            Some(&"fetched".to_string())
        );
    }
}
