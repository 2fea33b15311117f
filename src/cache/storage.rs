//! Cache storage trait with in-memory and SQLite implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::http::CachedResponse;

/// A single cached response together with its storage timestamp.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The captured response
  pub response: CachedResponse,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Stores are created lazily on first write. `put` overwrites any
/// existing entry for the same URL, and each put/get is atomic per key;
/// no operation spans multiple keys or stores.
pub trait CacheStorage: Send + Sync + 'static {
  /// Store a response under the given store name and URL (upsert).
  fn put(&self, store: &str, url: &str, response: &CachedResponse) -> Result<()>;

  /// Look up a cached response by store name and URL.
  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>>;

  /// Names of all stores that currently hold at least one entry.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a whole store and everything in it.
  fn drop_store(&self, store: &str) -> Result<()>;
}

/// In-memory storage backend.
///
/// Used by tests and by hosts that don't want a database file; contents
/// live only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn put(&self, store: &str, url: &str, response: &CachedResponse) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.entry(store.to_string()).or_default().insert(
      url.to_string(),
      CachedEntry {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(store).and_then(|s| s.get(url)).cloned())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.keys().cloned().collect())
  }

  fn drop_store(&self, store: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.remove(store);
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Create a new SQLite storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Create a storage backed by an in-memory database.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offcache").join("cache.db"))
  }

  /// Run database migrations for the cache table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
-- Captured responses, partitioned by store name and keyed by request URL
CREATE TABLE IF NOT EXISTS response_cache (
    store_name TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, url)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_store ON response_cache(store_name);
"#;

impl CacheStorage for SqliteStorage {
  fn put(&self, store: &str, url: &str, response: &CachedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (store_name, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![store, url, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn get(&self, store: &str, url: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM response_cache
         WHERE store_name = ? AND url = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![store, url], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;

        Ok(Some(CachedEntry {
          response: CachedResponse::new(status, headers, body),
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT store_name FROM response_cache")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query store names: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn drop_store(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM response_cache WHERE store_name = ?", params![store])
      .map_err(|e| eyre!("Failed to drop store {}: {}", store, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> CachedResponse {
    CachedResponse::new(
      200,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  fn roundtrip(storage: Box<dyn CacheStorage>) {
    assert!(storage.get("static-cache-v1", "https://example.com/a.js").unwrap().is_none());

    storage
      .put("static-cache-v1", "https://example.com/a.js", &response("alert(1)"))
      .unwrap();

    let entry = storage
      .get("static-cache-v1", "https://example.com/a.js")
      .unwrap()
      .expect("entry should exist");
    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.body, b"alert(1)");
    assert_eq!(entry.response.header("content-type"), Some("text/plain"));

    // Same URL in a different store is a different entry
    assert!(storage.get("pages-cache-v1", "https://example.com/a.js").unwrap().is_none());
  }

  #[test]
  fn test_memory_roundtrip() {
    roundtrip(Box::new(MemoryStorage::new()));
  }

  #[test]
  fn test_sqlite_roundtrip() {
    roundtrip(Box::new(SqliteStorage::in_memory().unwrap()));
  }

  fn overwrite_keeps_single_entry(storage: Box<dyn CacheStorage>) {
    storage
      .put("api-cache-v1", "https://example.com/rest/v1/posts", &response("old"))
      .unwrap();
    storage
      .put("api-cache-v1", "https://example.com/rest/v1/posts", &response("new"))
      .unwrap();

    let entry = storage
      .get("api-cache-v1", "https://example.com/rest/v1/posts")
      .unwrap()
      .unwrap();
    assert_eq!(entry.response.body, b"new");
    assert_eq!(storage.store_names().unwrap(), vec!["api-cache-v1"]);
  }

  #[test]
  fn test_memory_overwrite_keeps_single_entry() {
    overwrite_keeps_single_entry(Box::new(MemoryStorage::new()));
  }

  #[test]
  fn test_sqlite_overwrite_keeps_single_entry() {
    overwrite_keeps_single_entry(Box::new(SqliteStorage::in_memory().unwrap()));
  }

  fn drop_store_removes_only_that_store(storage: Box<dyn CacheStorage>) {
    storage.put("static-cache-v0", "https://example.com/a.js", &response("old")).unwrap();
    storage.put("static-cache-v1", "https://example.com/a.js", &response("new")).unwrap();

    storage.drop_store("static-cache-v0").unwrap();

    assert!(storage.get("static-cache-v0", "https://example.com/a.js").unwrap().is_none());
    assert!(storage.get("static-cache-v1", "https://example.com/a.js").unwrap().is_some());
    assert_eq!(storage.store_names().unwrap(), vec!["static-cache-v1"]);
  }

  #[test]
  fn test_memory_drop_store() {
    drop_store_removes_only_that_store(Box::new(MemoryStorage::new()));
  }

  #[test]
  fn test_sqlite_drop_store() {
    drop_store_removes_only_that_store(Box::new(SqliteStorage::in_memory().unwrap()));
  }

  #[test]
  fn test_sqlite_records_cached_at() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.put("pages-cache-v1", "https://example.com/", &response("<html>")).unwrap();

    let entry = storage.get("pages-cache-v1", "https://example.com/").unwrap().unwrap();
    // Stored just now; allow generous slack for slow test machines
    let age = Utc::now() - entry.cached_at;
    assert!(age.num_seconds().abs() < 60);
  }
}
