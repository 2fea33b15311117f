use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::Path;

/// Immutable proxy configuration.
///
/// The store names double as the cache version epoch: bumping a name
/// invalidates that whole partition at the next activation. A host that
/// wants automatic invalidation can derive the names from its build
/// identifier when constructing the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
  /// The page's own origin, e.g. "https://standardthought.com"
  pub origin: String,
  /// Store for static assets (cache-first)
  pub asset_store: String,
  /// Store for API responses (stale-while-revalidate)
  pub api_store: String,
  /// Store for HTML pages (network-first)
  pub page_store: String,
  /// Paths pre-fetched into the page store at install time
  pub precache_paths: Vec<String>,
  /// Third-party origins the proxy is allowed to intercept
  pub trusted_origins: Vec<String>,
  /// File extensions treated as static assets (case-sensitive)
  pub asset_extensions: Vec<String>,
  /// Path substrings that mark a request as a data-API call
  pub api_markers: Vec<String>,
  /// Path served as the ultimate offline fallback for HTML requests
  pub root_path: String,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      origin: "https://standardthought.com".to_string(),
      asset_store: "static-cache-v1".to_string(),
      api_store: "api-cache-v1".to_string(),
      page_store: "pages-cache-v1".to_string(),
      precache_paths: vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/robots.txt".to_string(),
      ],
      trusted_origins: vec![
        "https://fonts.googleapis.com".to_string(),
        "https://fonts.gstatic.com".to_string(),
        "https://cdn.gpteng.co".to_string(),
      ],
      asset_extensions: [
        "js", "css", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "woff", "woff2", "ttf",
        "eot",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      api_markers: vec!["/rest/v1/".to_string(), "/api/".to_string()],
      root_path: "/".to_string(),
    }
  }
}

impl ProxyConfig {
  /// Load configuration from a YAML file. Missing fields take defaults.
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: ProxyConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The names of all current cache stores.
  pub fn store_names(&self) -> [&str; 3] {
    [&self.asset_store, &self.api_store, &self.page_store]
  }

  /// Absolute URL for a same-origin path, e.g. "/" -> "https://.../".
  pub fn absolute_url(&self, path: &str) -> String {
    format!("{}{}", self.origin.trim_end_matches('/'), path)
  }

  /// Absolute URL of the root fallback page.
  pub fn root_url(&self) -> String {
    self.absolute_url(&self.root_path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_store_names() {
    let config = ProxyConfig::default();
    assert_eq!(
      config.store_names(),
      ["static-cache-v1", "api-cache-v1", "pages-cache-v1"]
    );
  }

  #[test]
  fn test_absolute_url_joins_origin_and_path() {
    let config = ProxyConfig::default();
    assert_eq!(config.root_url(), "https://standardthought.com/");
    assert_eq!(
      config.absolute_url("/manifest.json"),
      "https://standardthought.com/manifest.json"
    );
  }

  #[test]
  fn test_example_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.yaml");
    let config = ProxyConfig::load(&path).unwrap();
    let defaults = ProxyConfig::default();

    assert_eq!(config.origin, defaults.origin);
    assert_eq!(config.store_names(), defaults.store_names());
    assert_eq!(config.precache_paths, defaults.precache_paths);
    assert_eq!(config.trusted_origins, defaults.trusted_origins);
    assert_eq!(config.asset_extensions, defaults.asset_extensions);
    assert_eq!(config.api_markers, defaults.api_markers);
    assert_eq!(config.root_path, defaults.root_path);
  }

  #[test]
  fn test_partial_yaml_takes_defaults() {
    let yaml = r#"
origin: "https://staging.example.com"
page_store: "pages-cache-v2"
"#;
    let config: ProxyConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.origin, "https://staging.example.com");
    assert_eq!(config.page_store, "pages-cache-v2");
    // Untouched fields keep their defaults
    assert_eq!(config.asset_store, "static-cache-v1");
    assert_eq!(config.precache_paths, vec!["/", "/manifest.json", "/robots.txt"]);
  }
}
