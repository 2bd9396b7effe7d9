use std::any::Any;
use std::fmt::Display;
use std::sync::Arc;

use crate::context::SwrContext;
use crate::controller::{SwrConfig, SwrController};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::host::HostHandle;

/// Observable fetch state returned to the render path.
///
/// `data` and `error` are mutually exclusive once settled; both are `None`
/// only before the first settlement. `is_loading` is true only while the
/// first-ever attempt is in flight; `is_validating` is true during any
/// in-flight attempt.
#[derive(Debug)]
pub struct SwrState<V> {
    pub data: Option<Arc<V>>,
    pub error: Option<FetchError>,
    pub is_loading: bool,
    pub is_validating: bool,
}

impl<V> Clone for SwrState<V> {
    fn clone(&self) -> Self {
        SwrState {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
            is_validating: self.is_validating,
        }
    }
}

/// Render-time binding over one [`SwrController`].
///
/// Cheap to clone; clones share the controller.
pub struct SwrHandle<K, V> {
    controller: Arc<SwrController<K, V>>,
}

impl<K, V> Clone for SwrHandle<K, V> {
    fn clone(&self) -> Self {
        SwrHandle {
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<K, V> SwrHandle<K, V>
where
    K: Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    /// Evaluate and return the current state. Call this from the render
    /// path; any fetch it starts settles in the background and requests a
    /// re-render.
    pub fn get(&self) -> SwrState<V> {
        self.controller.evaluate();
        self.controller.current()
    }

    /// Evaluate and await the settlement of any attempt started, then
    /// return the state.
    pub async fn revalidate(&self) -> SwrState<V> {
        self.controller.revalidate().await;
        self.controller.current()
    }

    /// Manually settle with `value`, or invalidate the cached result when
    /// `value` is `None` so the next evaluation refetches.
    pub fn mutate(&self, value: Option<V>) {
        self.controller.mutate(value);
    }

    /// Manual refresh: invalidate, then refetch to settlement.
    pub async fn refresh(&self) -> SwrState<V> {
        self.controller.mutate(None);
        self.revalidate().await
    }

    /// Mount notification from the host.
    pub fn host_connected(&self) {
        self.controller.host_connected();
    }

    /// Unmount notification from the host.
    pub fn host_disconnected(&self) {
        self.controller.host_disconnected();
    }

    pub fn controller(&self) -> &Arc<SwrController<K, V>> {
        &self.controller
    }
}

/// Type-erased view of a handle kept in the per-host binding table.
pub(crate) trait Binding: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn host_disconnected(&self);
}

impl<K, V> Binding for SwrHandle<K, V>
where
    K: Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn host_disconnected(&self) {
        SwrHandle::host_disconnected(self);
    }
}

/// Create a binding for `key` on `host`.
///
/// This is the factory form of a framework property binding: the host
/// adapter keeps the returned handle for the component's lifetime, calls
/// [`SwrHandle::get`] from its render path and forwards mount/unmount to
/// [`SwrHandle::host_connected`]/[`SwrHandle::host_disconnected`].
///
/// A host that is already connected is registered with the refresh scheduler
/// immediately.
pub fn create_swr<K, V>(
    context: &SwrContext,
    host: HostHandle,
    key: K,
    fetcher: Arc<dyn Fetcher<K, V>>,
    config: SwrConfig,
) -> SwrHandle<K, V>
where
    K: Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    let controller = SwrController::new(context.clone(), host, key, fetcher, config);
    let handle = SwrHandle { controller };
    if handle.controller.host().is_connected() {
        handle.host_connected();
    }
    handle
}

/// Evaluate the binding for `(host, key)`, creating it on first access and
/// reusing it on every subsequent render.
pub fn use_swr<K, V>(
    context: &SwrContext,
    host: &HostHandle,
    key: K,
    fetcher: Arc<dyn Fetcher<K, V>>,
    config: SwrConfig,
) -> SwrState<V>
where
    K: Clone + Display + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    let cache_key = key.to_string();
    let handle = context.binding(host.id(), &cache_key, || {
        create_swr(context, host.clone(), key.clone(), fetcher, config)
    });
    handle.get()
}
