//! The cache proxy: one method per caching strategy plus the dispatch
//! point that routes a classified request to exactly one of them.
//!
//! Failure policy, shared by every strategy: cache-layer errors are
//! logged and degrade to a plain network fetch, never surfaced to the
//! host; network errors resolve to a cached fallback where one exists
//! and propagate otherwise; non-2xx responses are data, passed through
//! unmodified and never stored.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::NetworkBackend;
use crate::cache::CacheStorage;
use crate::classify::{classify, Classification};
use crate::config::ProxyConfig;
use crate::http::{CachedResponse, FetchRequest, ProxyResponse};

/// Cache proxy generic over a storage backend and a network backend.
pub struct CacheProxy<S: CacheStorage, B: NetworkBackend> {
  config: ProxyConfig,
  storage: Arc<S>,
  backend: Arc<B>,
}

impl<S: CacheStorage, B: NetworkBackend> CacheProxy<S, B> {
  pub fn new(config: ProxyConfig, storage: S, backend: B) -> Self {
    Self {
      config,
      storage: Arc::new(storage),
      backend: Arc::new(backend),
    }
  }

  pub fn config(&self) -> &ProxyConfig {
    &self.config
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn backend(&self) -> &Arc<B> {
    &self.backend
  }

  /// Handle one intercepted request.
  ///
  /// Returns `Ok(None)` when the request is not intercepted at all
  /// (non-GET, untrusted cross-origin); the host performs its own
  /// networking in that case.
  pub async fn handle_fetch(&self, req: &FetchRequest) -> Result<Option<ProxyResponse>> {
    match classify(req, &self.config) {
      Classification::PassThrough => Ok(None),
      Classification::Asset => self.cache_first(req).await.map(Some),
      Classification::Api => self.stale_while_revalidate(req).await.map(Some),
      Classification::Page => self.network_first(req).await.map(Some),
      Classification::NetworkOnly => self.network_only(req).await.map(Some),
    }
  }

  /// Cache-first, for static assets.
  ///
  /// A hit is served with no network call and no freshness check. A miss
  /// fetches, stores on a 200, and returns the live response either way.
  /// A failed fetch gets one plain retry whose outcome propagates.
  pub async fn cache_first(&self, req: &FetchRequest) -> Result<ProxyResponse> {
    let url = req.url.as_str();

    match self.storage.get(&self.config.asset_store, url) {
      Ok(Some(entry)) => {
        debug!(url, "asset cache hit");
        return Ok(ProxyResponse::from_cache(entry.response, entry.cached_at));
      }
      Ok(None) => {}
      Err(e) => warn!(url, error = %e, "asset cache lookup failed, going to network"),
    }

    match self.backend.fetch(req).await {
      Ok(resp) => {
        self.store_if_cacheable(&self.config.asset_store, url, &resp);
        Ok(ProxyResponse::from_network(resp))
      }
      Err(e) => {
        debug!(url, error = %e, "asset fetch failed, retrying without cache");
        let resp = self.backend.fetch(req).await?;
        Ok(ProxyResponse::from_network(resp))
      }
    }
  }

  /// Stale-while-revalidate, for data-API responses.
  ///
  /// The network fetch starts unconditionally and, on a 200, refreshes
  /// the store. A cache hit is returned immediately while the fetch finishes
  /// in the background for the next request; on a miss the caller gets
  /// the in-flight fetch result. If both fail, a last-resort plain fetch
  /// decides the outcome.
  pub async fn stale_while_revalidate(&self, req: &FetchRequest) -> Result<ProxyResponse> {
    let url = req.url.as_str();

    let fetch = self.backend.fetch(req);
    let store = self.config.api_store.clone();
    let storage = Arc::clone(&self.storage);
    let task_url = url.to_string();
    let revalidation = tokio::spawn(async move {
      let resp = fetch.await?;
      if resp.is_cacheable() {
        if let Err(e) = storage.put(&store, &task_url, &resp) {
          warn!(url = %task_url, error = %e, "failed to refresh api cache");
        } else {
          debug!(url = %task_url, "api cache refreshed");
        }
      }
      Ok::<CachedResponse, color_eyre::Report>(resp)
    });

    match self.storage.get(&self.config.api_store, url) {
      Ok(Some(entry)) => {
        // Serve stale immediately; the detached task keeps the cache warm
        debug!(url, "api cache hit, revalidating in background");
        return Ok(ProxyResponse::from_cache(entry.response, entry.cached_at));
      }
      Ok(None) => {}
      Err(e) => warn!(url, error = %e, "api cache lookup failed, waiting on network"),
    }

    // No cached entry: this call is effectively network-first
    match revalidation.await {
      Ok(Ok(resp)) => Ok(ProxyResponse::from_network(resp)),
      Ok(Err(e)) => {
        debug!(url, error = %e, "api fetch failed, last-resort plain fetch");
        let resp = self.backend.fetch(req).await?;
        Ok(ProxyResponse::from_network(resp))
      }
      Err(e) => {
        warn!(url, error = %e, "revalidation task failed, last-resort plain fetch");
        let resp = self.backend.fetch(req).await?;
        Ok(ProxyResponse::from_network(resp))
      }
    }
  }

  /// Network-first with cache fallback, for HTML pages.
  ///
  /// A successful fetch always wins and refreshes the page store. Only a
  /// failed fetch consults the cache: the requested URL first, then the
  /// root page, then the error propagates.
  pub async fn network_first(&self, req: &FetchRequest) -> Result<ProxyResponse> {
    let url = req.url.as_str();

    match self.backend.fetch(req).await {
      Ok(resp) => {
        self.store_if_cacheable(&self.config.page_store, url, &resp);
        Ok(ProxyResponse::from_network(resp))
      }
      Err(err) => {
        debug!(url, error = %err, "page fetch failed, trying cache");

        if let Ok(Some(entry)) = self.storage.get(&self.config.page_store, url) {
          return Ok(ProxyResponse::fallback(entry.response, entry.cached_at));
        }

        let root = self.config.root_url();
        if let Ok(Some(entry)) = self.storage.get(&self.config.page_store, &root) {
          debug!(url, "serving cached root page as offline fallback");
          return Ok(ProxyResponse::root_fallback(entry.response, entry.cached_at));
        }

        Err(err)
      }
    }
  }

  /// Plain network fetch for requests no other rule matched.
  ///
  /// On failure, HTML-accepting requests fall back to the cached root
  /// page; everything else propagates the error.
  pub async fn network_only(&self, req: &FetchRequest) -> Result<ProxyResponse> {
    match self.backend.fetch(req).await {
      Ok(resp) => Ok(ProxyResponse::from_network(resp)),
      Err(err) => {
        if req.accepts_html() {
          let root = self.config.root_url();
          if let Ok(Some(entry)) = self.storage.get(&self.config.page_store, &root) {
            return Ok(ProxyResponse::root_fallback(entry.response, entry.cached_at));
          }
        }
        Err(err)
      }
    }
  }

  /// Store a response if it is a plain 200; storage errors are logged
  /// and swallowed so a caching bug never breaks the response path.
  fn store_if_cacheable(&self, store: &str, url: &str, resp: &CachedResponse) {
    if !resp.is_cacheable() {
      return;
    }
    if let Err(e) = self.storage.put(store, url, resp) {
      warn!(url, store, error = %e, "failed to store response");
    } else {
      debug!(url, store, "stored response");
    }
  }
}

impl<S: CacheStorage, B: NetworkBackend> Clone for CacheProxy<S, B> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      storage: Arc::clone(&self.storage),
      backend: Arc::clone(&self.backend),
    }
  }
}
