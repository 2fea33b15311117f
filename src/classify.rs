//! Request classification: decides how a request is handled before any
//! cache or network I/O happens.

use reqwest::Method;

use crate::config::ProxyConfig;
use crate::http::FetchRequest;

/// How an intercepted request will be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Not intercepted at all: the host performs its own networking
  /// (non-GET methods, untrusted cross-origin requests)
  PassThrough,
  /// Data-API request: stale-while-revalidate against the API store
  Api,
  /// Static asset: cache-first against the asset store
  Asset,
  /// HTML page: network-first against the page store
  Page,
  /// Plain network fetch, with the cached root page as an HTML fallback
  NetworkOnly,
}

/// Classify a request. Pure function, first match wins:
///
/// 1. non-GET -> pass through
/// 2. cross-origin and not in the trusted allow-list -> pass through
/// 3. path contains an API marker -> Api
/// 4. path extension in the asset set -> Asset
/// 5. `Accept` header wants HTML -> Page
/// 6. everything else -> NetworkOnly
pub fn classify(req: &FetchRequest, config: &ProxyConfig) -> Classification {
  if req.method != Method::GET {
    return Classification::PassThrough;
  }

  let origin = req.origin();
  if origin != config.origin && !config.trusted_origins.iter().any(|o| *o == origin) {
    return Classification::PassThrough;
  }

  let path = req.url.path();
  if config.api_markers.iter().any(|m| path.contains(m.as_str())) {
    return Classification::Api;
  }

  if let Some(ext) = req.path_extension() {
    if config.asset_extensions.iter().any(|e| e == ext) {
      return Classification::Asset;
    }
  }

  if req.accepts_html() {
    return Classification::Page;
  }

  Classification::NetworkOnly
}
