use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::host::HostId;
use crate::utils::now_ms;

/// A controller as seen by the refresh scheduler.
pub trait RefreshTarget: Send + Sync {
    /// Registry identity, stable for the target's lifetime.
    fn target_id(&self) -> u64;

    /// Configured refresh period in milliseconds. A non-positive interval
    /// disables periodic refresh and makes registration a no-op.
    fn refresh_interval(&self) -> i64;

    /// Timestamp (ms) of the last settled attempt; 0 before the first one.
    fn last_settled_at(&self) -> i64;

    /// Whether the owning host is still mounted.
    fn is_connected(&self) -> bool;

    /// Recompute state and start a fetch if stale. Must not block.
    fn refresh(self: Arc<Self>);
}

struct Timer {
    period: i64,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    targets: HashMap<u64, Arc<dyn RefreshTarget>>,
    timer: Option<Timer>,
}

/// Periodic revalidation driver for a single host.
///
/// All registered targets share one timer whose period is the minimum
/// refresh interval across the set. The timer is restarted on every
/// membership change and torn down when the last target leaves, so a
/// registered set always has exactly one timer and an empty set has none.
///
/// Each tick walks the set and refreshes the targets whose own interval has
/// elapsed; targets with longer intervals are checked and skipped on ticks
/// that are not theirs. Disconnected targets are skipped but stay
/// registered, so a host that reconnects resumes its schedule without
/// re-registering.
pub struct RefreshScheduler {
    inner: Mutex<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(RefreshScheduler {
            inner: Mutex::new(SchedulerInner {
                targets: HashMap::new(),
                timer: None,
            }),
        })
    }

    /// Add a target and restart the timer at the new minimum interval.
    ///
    /// No-op for targets with a non-positive interval.
    pub fn register(self: &Arc<Self>, target: Arc<dyn RefreshTarget>) {
        if target.refresh_interval() <= 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.targets.insert(target.target_id(), target);
        self.reschedule(&mut inner);
    }

    /// Remove a target, restarting or cancelling the timer as needed.
    ///
    /// Returns `true` when the registered set became empty so the owner can
    /// drop its registry entry.
    pub fn unregister(self: &Arc<Self>, target_id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.targets.remove(&target_id);
        self.reschedule(&mut inner);
        inner.targets.is_empty()
    }

    /// Cancel the timer and drop every target, registered or not.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.targets.clear();
        if let Some(timer) = inner.timer.take() {
            timer.task.abort();
        }
    }

    /// Current timer period in milliseconds, `None` while no timer runs.
    pub fn period(&self) -> Option<i64> {
        self.inner.lock().unwrap().timer.as_ref().map(|t| t.period)
    }

    fn reschedule(self: &Arc<Self>, inner: &mut SchedulerInner) {
        if let Some(timer) = inner.timer.take() {
            timer.task.abort();
        }

        let Some(period) = inner.targets.values().map(|t| t.refresh_interval()).min() else {
            return;
        };

        tracing::debug!(period_ms = period, "coalesced refresh timer restarted");
        let scheduler = Arc::downgrade(self);
        let task = tokio::spawn(run_timer(scheduler, period));
        inner.timer = Some(Timer { period, task });
    }

    fn tick(&self) {
        let due: Vec<Arc<dyn RefreshTarget>> = {
            let inner = self.inner.lock().unwrap();
            let now = now_ms();
            inner
                .targets
                .values()
                .filter(|t| t.is_connected())
                .filter(|t| now - t.last_settled_at() >= t.refresh_interval())
                .cloned()
                .collect()
        };

        for target in due {
            target.refresh();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(timer) = inner.timer.take() {
                timer.task.abort();
            }
        }
    }
}

/// Timer loop. Holds only a weak back-reference so an abandoned scheduler
/// cannot be kept alive by its own timer.
async fn run_timer(scheduler: Weak<RefreshScheduler>, period: i64) {
    let period = Duration::from_millis(period as u64);
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        ticks.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            return;
        };
        scheduler.tick();
    }
}

/// Host-keyed scheduler side table with manual removal.
///
/// Schedulers are created lazily on first registration and removed when the
/// host's last target unregisters or the host disconnects, so no entry (and
/// no timer) outlives the host's interest.
pub struct SchedulerRegistry {
    schedulers: Mutex<HashMap<HostId, Arc<RefreshScheduler>>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        SchedulerRegistry {
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `target` under `host`, creating the scheduler on first use.
    pub fn register(&self, host: HostId, target: Arc<dyn RefreshTarget>) {
        if target.refresh_interval() <= 0 {
            return;
        }
        let scheduler = {
            let mut map = self.schedulers.lock().unwrap();
            map.entry(host).or_insert_with(RefreshScheduler::new).clone()
        };
        scheduler.register(target);
    }

    /// Remove one target; drops the host's entry when it was the last.
    pub fn unregister(&self, host: HostId, target_id: u64) {
        let scheduler = self.schedulers.lock().unwrap().get(&host).cloned();
        let Some(scheduler) = scheduler else { return };

        if scheduler.unregister(target_id) {
            self.schedulers.lock().unwrap().remove(&host);
        }
    }

    /// Tear down the host's scheduler entirely, regardless of what is still
    /// registered (host destruction).
    pub fn disconnect(&self, host: HostId) {
        let scheduler = self.schedulers.lock().unwrap().remove(&host);
        if let Some(scheduler) = scheduler {
            scheduler.shutdown();
        }
    }

    /// Timer period for `host`, `None` when it has no scheduler or timer.
    pub fn period(&self, host: HostId) -> Option<i64> {
        let scheduler = self.schedulers.lock().unwrap().get(&host).cloned();
        scheduler.and_then(|s| s.period())
    }
}

impl Default for SchedulerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    struct TestTarget {
        id: u64,
        interval: i64,
        last_settled: AtomicI64,
        connected: AtomicBool,
        refreshes: AtomicUsize,
    }

    impl TestTarget {
        fn new(id: u64, interval: i64) -> Arc<Self> {
            Arc::new(TestTarget {
                id,
                interval,
                last_settled: AtomicI64::new(0),
                connected: AtomicBool::new(true),
                refreshes: AtomicUsize::new(0),
            })
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    impl RefreshTarget for TestTarget {
        fn target_id(&self) -> u64 {
            self.id
        }

        fn refresh_interval(&self) -> i64 {
            self.interval
        }

        fn last_settled_at(&self) -> i64 {
            self.last_settled.load(Ordering::SeqCst)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn refresh(self: Arc<Self>) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.last_settled.store(now_ms(), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_timer_coalesces_to_minimum_interval() {
        let scheduler = RefreshScheduler::new();
        let slow = TestTarget::new(1, 5000);
        let fast = TestTarget::new(2, 2000);

        scheduler.register(slow.clone());
        assert_eq!(scheduler.period(), Some(5000));

        scheduler.register(fast.clone());
        assert_eq!(scheduler.period(), Some(2000));

        assert!(!scheduler.unregister(fast.id));
        assert_eq!(scheduler.period(), Some(5000));

        assert!(scheduler.unregister(slow.id));
        assert_eq!(scheduler.period(), None);
    }

    #[tokio::test]
    async fn test_zero_interval_registration_is_noop() {
        let scheduler = RefreshScheduler::new();
        scheduler.register(TestTarget::new(1, 0));
        assert_eq!(scheduler.period(), None);
    }

    #[tokio::test]
    async fn test_due_targets_are_refreshed() {
        let scheduler = RefreshScheduler::new();
        let target = TestTarget::new(1, 20);
        scheduler.register(target.clone());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(target.refreshes() >= 2);
    }

    #[tokio::test]
    async fn test_disconnected_target_is_skipped_but_kept() {
        let scheduler = RefreshScheduler::new();
        let target = TestTarget::new(1, 20);
        target.connected.store(false, Ordering::SeqCst);
        scheduler.register(target.clone());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(target.refreshes(), 0);

        // Reconnecting resumes the existing schedule.
        target.connected.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(target.refreshes() >= 1);
    }

    #[tokio::test]
    async fn test_not_yet_due_target_is_skipped() {
        let scheduler = RefreshScheduler::new();
        let fast = TestTarget::new(1, 20);
        let slow = TestTarget::new(2, 60_000);
        slow.last_settled.store(now_ms(), Ordering::SeqCst);

        scheduler.register(fast.clone());
        scheduler.register(slow.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fast.refreshes() >= 1);
        assert_eq!(slow.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_timer_and_targets() {
        let scheduler = RefreshScheduler::new();
        let target = TestTarget::new(1, 20);
        scheduler.register(target.clone());

        scheduler.shutdown();
        assert_eq!(scheduler.period(), None);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(target.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_registry_creates_and_removes_per_host() {
        let registry = SchedulerRegistry::new();
        let host_a = crate::host::HostHandle::new(Arc::new(NullHost)).id();
        let host_b = crate::host::HostHandle::new(Arc::new(NullHost)).id();

        let target = TestTarget::new(1, 2000);
        registry.register(host_a, target.clone());
        assert_eq!(registry.period(host_a), Some(2000));
        assert_eq!(registry.period(host_b), None);

        registry.unregister(host_a, target.id);
        assert_eq!(registry.period(host_a), None);
    }

    #[tokio::test]
    async fn test_registry_disconnect_force_clears() {
        let registry = SchedulerRegistry::new();
        let host = crate::host::HostHandle::new(Arc::new(NullHost)).id();

        registry.register(host, TestTarget::new(1, 2000));
        registry.register(host, TestTarget::new(2, 5000));

        registry.disconnect(host);
        assert_eq!(registry.period(host), None);
    }

    struct NullHost;

    impl crate::host::RenderHost for NullHost {
        fn request_update(&self) {}

        fn is_connected(&self) -> bool {
            true
        }
    }
}
