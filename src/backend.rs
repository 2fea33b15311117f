//! Network access behind a trait so the proxy can be driven by a real
//! HTTP client in production and a scripted backend in tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::time::Duration;

use crate::http::{CachedResponse, FetchRequest};

/// Performs a request against the live network.
///
/// Returns a boxed `'static` future so strategies can race the fetch
/// against a cache lookup or detach it as a background revalidation.
pub trait NetworkBackend: Send + Sync + 'static {
  fn fetch(&self, req: &FetchRequest) -> BoxFuture<'static, Result<CachedResponse>>;
}

/// reqwest-backed network backend.
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
}

impl HttpBackend {
  /// Create a backend with the default client settings.
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offcache/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(20))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }

  /// Create a backend around an existing client.
  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

impl NetworkBackend for HttpBackend {
  fn fetch(&self, req: &FetchRequest) -> BoxFuture<'static, Result<CachedResponse>> {
    let client = self.client.clone();
    let method = req.method.clone();
    let url = req.url.clone();
    let headers = req.headers.clone();

    Box::pin(async move {
      let mut builder = client.request(method, url.clone());
      for (name, value) in &headers {
        builder = builder.header(name, value);
      }

      let resp = builder
        .send()
        .await
        .map_err(|e| eyre!("Fetch failed for {}: {}", url, e))?;

      let status = resp.status().as_u16();
      let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = resp
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body for {}: {}", url, e))?
        .to_vec();

      Ok(CachedResponse::new(status, headers, body))
    })
  }
}

#[cfg(test)]
pub mod mock {
  //! Scripted backend for strategy tests: per-URL outcomes, a call
  //! counter and an optional artificial network delay.

  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  #[derive(Clone)]
  pub enum MockOutcome {
    Respond(CachedResponse),
    Fail,
  }

  #[derive(Default)]
  pub struct MockBackend {
    outcomes: Mutex<HashMap<String, MockOutcome>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
  }

  impl MockBackend {
    pub fn new() -> Self {
      Self::default()
    }

    /// Script a successful response for a URL.
    pub fn respond(&self, url: &str, response: CachedResponse) {
      self
        .outcomes
        .lock()
        .unwrap()
        .insert(url.to_string(), MockOutcome::Respond(response));
    }

    /// Script a network failure for a URL.
    pub fn fail(&self, url: &str) {
      self
        .outcomes
        .lock()
        .unwrap()
        .insert(url.to_string(), MockOutcome::Fail);
    }

    /// Delay every fetch by the given duration.
    pub fn set_delay(&self, delay: Duration) {
      *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of fetches performed so far.
    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl NetworkBackend for MockBackend {
    fn fetch(&self, req: &FetchRequest) -> BoxFuture<'static, Result<CachedResponse>> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      let url = req.url.to_string();
      let outcome = self.outcomes.lock().unwrap().get(&url).cloned();
      let delay = *self.delay.lock().unwrap();

      Box::pin(async move {
        if let Some(delay) = delay {
          tokio::time::sleep(delay).await;
        }

        match outcome {
          Some(MockOutcome::Respond(response)) => Ok(response),
          Some(MockOutcome::Fail) | None => Err(eyre!("Simulated network failure for {}", url)),
        }
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::mock::MockBackend;
  use super::*;

  fn ok(body: &str) -> CachedResponse {
    CachedResponse::new(200, vec![], body.as_bytes().to_vec())
  }

  #[tokio::test]
  async fn test_mock_counts_calls_and_scripts_outcomes() {
    let backend = MockBackend::new();
    backend.respond("https://example.com/a", ok("hello"));
    backend.fail("https://example.com/b");

    let req = FetchRequest::get("https://example.com/a").unwrap();
    let resp = backend.fetch(&req).await.unwrap();
    assert_eq!(resp.body, b"hello");

    let req = FetchRequest::get("https://example.com/b").unwrap();
    assert!(backend.fetch(&req).await.is_err());

    // Unscripted URLs behave as offline
    let req = FetchRequest::get("https://example.com/c").unwrap();
    assert!(backend.fetch(&req).await.is_err());

    assert_eq!(backend.calls(), 3);
  }
}
