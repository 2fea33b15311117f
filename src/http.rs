//! Request and response snapshot types shared by the selector, the
//! strategies and the cache stores.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// An intercepted outgoing HTTP request.
///
/// Only the parts the proxy needs to classify and replay the request are
/// carried: method, full URL and headers. Request bodies never reach the
/// proxy because only GET requests are intercepted.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl FetchRequest {
  /// Create a GET request for the given URL.
  pub fn get(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL {}: {}", url, e))?;
    Ok(Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
    })
  }

  /// Create a request with an explicit method.
  pub fn new(method: Method, url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL {}: {}", url, e))?;
    Ok(Self {
      method,
      url,
      headers: Vec::new(),
    })
  }

  /// Add a header (builder style).
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Look up a header value by name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the request's `Accept` header asks for an HTML document.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|v| v.contains("text/html"))
      .unwrap_or(false)
  }

  /// File extension of the last path segment, if any.
  ///
  /// `/assets/app.abc123.js` yields `js`; `/blog/my-post` yields `None`.
  pub fn path_extension(&self) -> Option<&str> {
    let segment = self.url.path().rsplit('/').next().unwrap_or("");
    segment.rsplit_once('.').map(|(_, ext)| ext)
  }

  /// The request's origin in ASCII serialization, e.g. `https://example.com`.
  pub fn origin(&self) -> String {
    self.url.origin().ascii_serialization()
  }
}

/// A captured HTTP response: status, headers and body bytes.
///
/// This is the value stored in the named cache stores and returned to the
/// host, so it must round-trip through serde for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Whether the status is in the success range (2xx).
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether a caching strategy may store this response.
  ///
  /// Only a plain 200 qualifies: a 206 Partial Content or 204 No Content
  /// body must never be replayed from cache as if it were the full
  /// resource.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }

  /// Look up a header value by name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Indicates which path produced a proxied response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh response from the live network
  Network,
  /// Served from a cache store without waiting on the network
  Cache,
  /// Network failed; the cached copy of the requested URL was served
  Fallback,
  /// Network failed; the cached root page was served as a last resort
  RootFallback,
}

/// A response returned by the proxy, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
  /// The actual response
  pub response: CachedResponse,
  /// Which path produced it
  pub source: ResponseSource,
  /// When the response was cached (if it came from a store)
  pub cached_at: Option<DateTime<Utc>>,
}

impl ProxyResponse {
  /// A live response straight from the network.
  pub fn from_network(response: CachedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  /// A cache hit served without consulting the network result.
  pub fn from_cache(response: CachedResponse, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// A cached copy served because the network failed.
  pub fn fallback(response: CachedResponse, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResponseSource::Fallback,
      cached_at: Some(cached_at),
    }
  }

  /// The cached root page served because nothing better was available.
  pub fn root_fallback(response: CachedResponse, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResponseSource::RootFallback,
      cached_at: Some(cached_at),
    }
  }
}
