use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The surface a host component framework exposes to the fetch runtime.
///
/// The runtime calls `request_update` whenever observable state changes;
/// hosts are free to coalesce bursts of requests into a single re-render.
/// `is_connected` gates scheduled refresh ticks so a torn-down component is
/// never acted on.
pub trait RenderHost: Send + Sync {
    /// Ask the host to re-render.
    fn request_update(&self);

    /// Whether the owning component is currently mounted.
    fn is_connected(&self) -> bool;
}

/// Process-unique identity for a host, used to key per-host side tables.
///
/// Side tables keyed by `HostId` do not extend the host's lifetime; entries
/// are removed manually on deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(u64);

static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);

impl HostId {
    fn next() -> Self {
        HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A host paired with its identity. Clones share the same host and id.
#[derive(Clone)]
pub struct HostHandle {
    id: HostId,
    host: Arc<dyn RenderHost>,
}

impl HostHandle {
    pub fn new(host: Arc<dyn RenderHost>) -> Self {
        HostHandle {
            id: HostId::next(),
            host,
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn request_update(&self) {
        self.host.request_update();
    }

    pub fn is_connected(&self) -> bool {
        self.host.is_connected()
    }
}
