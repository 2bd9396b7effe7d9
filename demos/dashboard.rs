//! Demo: a fake dashboard component polling two endpoints through the SWR
//! runtime, with one coalesced refresh timer driving both.
//!
//! Run with `cargo run --example dashboard`. Set `RUST_LOG=debug` to watch
//! the scheduler restart its timer as bindings come and go.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use swr_fetch::{
    FetchError, Fetcher, HostHandle, RenderHost, SwrConfig, SwrContext, create_swr, fetch_fn,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Quote {
    symbol: String,
    price: u64,
}

/// Stand-in for a framework component: counts dirty marks instead of
/// re-rendering.
struct DashboardHost {
    connected: AtomicBool,
    dirty: AtomicUsize,
}

impl DashboardHost {
    fn new() -> Arc<Self> {
        Arc::new(DashboardHost {
            connected: AtomicBool::new(true),
            dirty: AtomicUsize::new(0),
        })
    }

    fn take_dirty(&self) -> bool {
        self.dirty.swap(0, Ordering::SeqCst) > 0
    }
}

impl RenderHost for DashboardHost {
    fn request_update(&self) {
        self.dirty.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Fake origin: ~40ms of latency, JSON on the wire, prices drifting upward
/// so refreshes stay visible.
fn quote_fetcher() -> Arc<dyn Fetcher<String, Quote>> {
    let tick = Arc::new(AtomicUsize::new(0));
    Arc::new(fetch_fn(move |key: String, _cancel| {
        let tick = tick.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            let n = tick.fetch_add(1, Ordering::SeqCst) as u64;
            let raw = format!(r#"{{"symbol":"{}","price":{}}}"#, key, 100 + n);
            serde_json::from_str::<Quote>(&raw).map_err(|e| FetchError::failed(&key, e.to_string()))
        }
    }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let context = SwrContext::global();
    let component = DashboardHost::new();
    let host = HostHandle::new(component.clone());

    // Two tickers on one host: the scheduler coalesces 300ms and 500ms into
    // a single 300ms timer.
    let acme = create_swr(
        &context,
        host.clone(),
        "ACME".to_string(),
        quote_fetcher(),
        SwrConfig {
            refresh_interval: 300,
            max_age: None,
        },
    );
    let initech = create_swr(
        &context,
        host.clone(),
        "INTC".to_string(),
        quote_fetcher(),
        SwrConfig {
            refresh_interval: 500,
            max_age: None,
        },
    );

    println!(
        "coalesced refresh period: {:?}ms",
        context.refresh_period(host.id())
    );

    // Render loop: repaint whenever a binding marked the host dirty.
    for frame in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if frame == 0 || component.take_dirty() {
            let a = acme.get();
            let i = initech.get();
            println!(
                "frame {frame:>2}  {}  {}  (loading: {}/{})",
                a.data
                    .map(|q| format!("{}={}", q.symbol, q.price))
                    .unwrap_or_else(|| "ACME=?".to_string()),
                i.data
                    .map(|q| format!("{}={}", q.symbol, q.price))
                    .unwrap_or_else(|| "INTC=?".to_string()),
                a.is_loading,
                i.is_loading,
            );
        }
    }

    // Component unmounts: the timer stops and in-flight fetches are
    // discarded.
    component.connected.store(false, Ordering::SeqCst);
    acme.host_disconnected();
    initech.host_disconnected();
    println!(
        "after teardown, refresh period: {:?}",
        context.refresh_period(host.id())
    );
}
