//! Offline-first HTTP cache proxy.
//!
//! `offcache` sits between a host application's outgoing requests and the
//! network, routing each GET through one of three caching strategies:
//!
//! - **cache-first** for static assets (scripts, styles, images, fonts)
//! - **stale-while-revalidate** for data-API responses
//! - **network-first with cache fallback** for HTML pages
//!
//! Responses live in three named cache stores keyed by request URL; the
//! store names double as the version epoch, and activation drops every
//! store from an older deployment. The worst failure mode is deliberate:
//! if anything in the cache layer goes wrong, requests behave as if no
//! cache existed.
//!
//! ```no_run
//! use offcache::{FetchRequest, HttpBackend, OfflineWorker, ProxyConfig, SqliteStorage};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let worker = OfflineWorker::new(ProxyConfig::default(), SqliteStorage::open()?, HttpBackend::new()?);
//! worker.install().await?;
//! worker.activate().await?;
//!
//! let req = FetchRequest::get("https://standardthought.com/blog/my-post")?
//!   .with_header("Accept", "text/html");
//! if let Some(resp) = worker.handle_fetch(&req).await? {
//!   println!("{} via {:?}", resp.response.status, resp.source);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod classify;
pub mod config;
pub mod http;
pub mod proxy;
pub mod worker;

pub use backend::{HttpBackend, NetworkBackend};
pub use cache::{CacheStorage, CachedEntry, MemoryStorage, SqliteStorage};
pub use classify::{classify, Classification};
pub use config::ProxyConfig;
pub use http::{CachedResponse, FetchRequest, ProxyResponse, ResponseSource};
pub use proxy::CacheProxy;
pub use worker::{LifecycleState, OfflineWorker, WorkerMessage};
