//! Worker lifecycle: install-time precaching, activate-time garbage
//! collection of stale stores, and the runtime skip-waiting message.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::backend::NetworkBackend;
use crate::cache::CacheStorage;
use crate::config::ProxyConfig;
use crate::http::{FetchRequest, ProxyResponse};
use crate::proxy::CacheProxy;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Precaching the seed list
  Installing,
  /// Installed, cleanup pending
  Activating,
  /// Controlling requests
  Active,
}

impl LifecycleState {
  /// Whether the worker intercepts fetches in this state.
  pub fn can_intercept(&self) -> bool {
    matches!(self, LifecycleState::Active)
  }
}

impl std::fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      LifecycleState::Installing => write!(f, "installing"),
      LifecycleState::Activating => write!(f, "activating"),
      LifecycleState::Active => write!(f, "active"),
    }
  }
}

/// Runtime control messages recognized by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
  /// Promote a waiting worker to activation without a reload
  SkipWaiting,
}

#[derive(Deserialize)]
struct RawMessage {
  #[serde(rename = "type")]
  kind: String,
}

impl WorkerMessage {
  /// Parse a raw JSON control message; unrecognized messages yield `None`.
  pub fn parse(raw: &str) -> Option<Self> {
    let msg: RawMessage = serde_json::from_str(raw).ok()?;
    match msg.kind.as_str() {
      "SKIP_WAITING" => Some(WorkerMessage::SkipWaiting),
      _ => None,
    }
  }
}

/// The offline worker: a cache proxy plus its lifecycle.
///
/// Hosts drive it through `install` / `activate` once per version, then
/// feed every intercepted request to `handle_fetch`.
pub struct OfflineWorker<S: CacheStorage, B: NetworkBackend> {
  proxy: CacheProxy<S, B>,
  state: RwLock<LifecycleState>,
}

impl<S: CacheStorage, B: NetworkBackend> OfflineWorker<S, B> {
  pub fn new(config: ProxyConfig, storage: S, backend: B) -> Self {
    Self {
      proxy: CacheProxy::new(config, storage, backend),
      state: RwLock::new(LifecycleState::Installing),
    }
  }

  pub fn state(&self) -> LifecycleState {
    // A poisoned lock still holds a valid Copy state; recover the guard
    *self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  pub fn proxy(&self) -> &CacheProxy<S, B> {
    &self.proxy
  }

  fn set_state(&self, new_state: LifecycleState) {
    let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
    if *state != new_state {
      debug!(from = %state, to = %new_state, "lifecycle transition");
      *state = new_state;
    }
  }

  /// Install: precache the seed list into the page store, then skip
  /// waiting so the new version activates without a reload.
  ///
  /// Any failed seed fetch fails the install and leaves the worker in
  /// `Installing`.
  pub async fn install(&self) -> Result<()> {
    let config = self.proxy.config().clone();
    info!(store = %config.page_store, "installing: precaching {} seed paths", config.precache_paths.len());

    for path in &config.precache_paths {
      let url = config.absolute_url(path);
      let req = FetchRequest::get(&url)?;

      let resp = self.proxy.backend().fetch(&req).await?;
      if !resp.is_success() {
        return Err(eyre!("Failed to precache {}: status {}", url, resp.status));
      }

      self.proxy.storage().put(&config.page_store, &url, &resp)?;
      debug!(url = %url, "precached");
    }

    self.set_state(LifecycleState::Activating);
    Ok(())
  }

  /// Activate: drop every store whose name is not one of the three
  /// current constants, then claim control of request interception.
  ///
  /// This is the sole eviction mechanism; there is no per-entry TTL,
  /// LRU or size cap.
  pub async fn activate(&self) -> Result<()> {
    let current = self.proxy.config().store_names();

    for name in self.proxy.storage().store_names()? {
      if !current.contains(&name.as_str()) {
        info!(store = %name, "evicting stale cache store");
        self.proxy.storage().drop_store(&name)?;
      }
    }

    self.set_state(LifecycleState::Active);
    info!("worker active, claiming request interception");
    Ok(())
  }

  /// Handle a runtime control message. Returns the recognized command,
  /// if any; unknown messages are ignored.
  pub fn handle_message(&self, raw: &str) -> Option<WorkerMessage> {
    let msg = WorkerMessage::parse(raw)?;
    match msg {
      WorkerMessage::SkipWaiting => {
        if self.state() == LifecycleState::Installing {
          self.set_state(LifecycleState::Activating);
        }
      }
    }
    Some(msg)
  }

  /// Handle one intercepted request.
  ///
  /// Returns `Ok(None)` until the worker is active, and for requests the
  /// selector declines to intercept.
  pub async fn handle_fetch(&self, req: &FetchRequest) -> Result<Option<ProxyResponse>> {
    if !self.state().can_intercept() {
      return Ok(None);
    }
    self.proxy.handle_fetch(req).await
  }

  /// Drop all three current stores. Debug/admin affordance; eviction
  /// granularity stays whole-partition.
  pub fn purge(&self) -> Result<()> {
    for name in self.proxy.config().store_names() {
      self.proxy.storage().drop_store(name)?;
    }
    info!("purged all cache stores");
    Ok(())
  }
}
