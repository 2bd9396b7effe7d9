//! swr-fetch - Stale-while-revalidate data fetching for reactive UI hosts
//!
//! This library provides the data layer of the SWR pattern for any component
//! framework that can report mount/unmount and accept re-render requests:
//! - Serve the last-known value immediately, refetch in the background when
//!   it has grown stale
//! - Fixed-capacity LRU result cache shared across all bindings
//! - One refresh timer per host, coalesced to the minimum configured
//!   interval
//! - At most one in-flight fetch per binding, with abort on host teardown
//!
//! The crate must run inside a tokio runtime; fetches and refresh timers are
//! spawned tasks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swr_fetch::{RenderHost, HostHandle, SwrConfig, SwrContext, create_swr, fetch_fn};
//!
//! struct MyComponent { /* framework state */ }
//!
//! impl RenderHost for MyComponent {
//!     fn request_update(&self) { /* schedule a re-render */ }
//!     fn is_connected(&self) -> bool { true }
//! }
//!
//! # async fn demo(component: Arc<MyComponent>) {
//! let host = HostHandle::new(component);
//! let prices = create_swr(
//!     &SwrContext::global(),
//!     host,
//!     "prices/acme".to_string(),
//!     Arc::new(fetch_fn(|key: String, _cancel| async move {
//!         // any transport: HTTP, database, IPC...
//!         Ok(format!("quote for {}", key))
//!     })),
//!     SwrConfig { refresh_interval: 30_000, max_age: None },
//! );
//!
//! // From the render path:
//! let state = prices.get();
//! if let Some(quote) = state.data {
//!     println!("{}", quote);
//! }
//! # }
//! ```

mod context;
mod controller;
mod entry;
mod error;
mod fetcher;
mod host;
mod lru;
mod scheduler;
mod swr;
mod utils;

// Re-export public API
pub use context::{DEFAULT_CACHE_CAPACITY, SwrContext};
pub use controller::{DEFAULT_MAX_AGE_MS, Status, SwrConfig, SwrController};
pub use entry::{CacheEntry, TypedEntry};
pub use error::FetchError;
pub use fetcher::{Fetcher, FnFetcher, fetch_fn};
pub use host::{HostHandle, HostId, RenderHost};
pub use lru::LruCache;
pub use scheduler::{RefreshScheduler, RefreshTarget, SchedulerRegistry};
pub use swr::{SwrHandle, SwrState, create_swr, use_swr};

// Custom fetchers need the token type in their signatures.
pub use tokio_util::sync::CancellationToken;
