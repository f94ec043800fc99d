//! Cache generation storage trait and SQLite implementation.
//!
//! A generation is a named bundle of captured request/response pairs.
//! Exactly one generation name is current at any time; stale generations
//! are deleted wholesale when a new one activates.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use super::types::{FetchRequest, FetchResponse, ResponseType};

#[derive(Debug, Error)]
pub enum CacheStoreError {
  #[error("cache store error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("cache entry headers corrupt: {0}")]
  Headers(#[from] serde_json::Error),

  #[error("cache store lock poisoned")]
  Poisoned,

  #[error("could not determine data directory")]
  NoDataDir,
}

/// Storage backend for cache generations.
pub trait GenerationStore: Send + Sync {
  /// Store a response under a generation, replacing any previous entry for
  /// the same request.
  fn put(
    &self,
    generation: &str,
    request: &FetchRequest,
    response: &FetchResponse,
  ) -> Result<(), CacheStoreError>;

  /// Look up a cached response for the exact request.
  fn get(
    &self,
    generation: &str,
    request: &FetchRequest,
  ) -> Result<Option<FetchResponse>, CacheStoreError>;

  /// Names of all generations currently holding entries.
  fn generations(&self) -> Result<Vec<String>, CacheStoreError>;

  /// Drop a whole generation. Returns whether anything was deleted.
  fn delete_generation(&self, generation: &str) -> Result<bool, CacheStoreError>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<u64, CacheStoreError>;
}

/// Schema for the cache table. Entries are keyed by generation plus the
/// request key (method + URL; GET only in practice).
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, method, url)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_generation
    ON cache_entries(generation);
"#;

/// SQLite-based generation store.
pub struct SqliteGenerations {
  conn: Mutex<Connection>,
}

impl SqliteGenerations {
  /// Open or create the cache database at the default location.
  pub fn open() -> Result<Self, CacheStoreError> {
    let path = Self::default_path().ok_or(CacheStoreError::NoDataDir)?;
    Self::open_at(&path)
  }

  /// Open or create the cache database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, CacheStoreError> {
    if let Some(parent) = path.parent() {
      let _ = std::fs::create_dir_all(parent);
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(CACHE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn open_in_memory() -> Result<Self, CacheStoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(CACHE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("cerita").join("cache.db"))
  }
}

impl GenerationStore for SqliteGenerations {
  fn put(
    &self,
    generation: &str,
    request: &FetchRequest,
    response: &FetchResponse,
  ) -> Result<(), CacheStoreError> {
    let headers = serde_json::to_string(&response.headers)?;

    let conn = self.conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_entries
         (generation, method, url, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        request.method.as_str(),
        request.url,
        response.status,
        response.response_type.as_str(),
        headers,
        response.body
      ],
    )?;

    Ok(())
  }

  fn get(
    &self,
    generation: &str,
    request: &FetchRequest,
  ) -> Result<Option<FetchResponse>, CacheStoreError> {
    let conn = self.conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
    let mut stmt = conn.prepare(
      "SELECT status, response_type, headers, body FROM cache_entries
       WHERE generation = ? AND method = ? AND url = ?",
    )?;

    let row: Option<(u16, String, String, Vec<u8>)> = stmt
      .query_row(
        params![generation, request.method.as_str(), request.url],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .ok();

    match row {
      Some((status, response_type, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        Ok(Some(FetchResponse {
          status,
          response_type: ResponseType::parse(&response_type),
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn generations(&self) -> Result<Vec<String>, CacheStoreError> {
    let conn = self.conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
    let mut stmt =
      conn.prepare("SELECT DISTINCT generation FROM cache_entries ORDER BY generation")?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .filter_map(|r| r.ok())
      .collect();
    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, CacheStoreError> {
    let conn = self.conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
    let deleted = conn.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )?;
    Ok(deleted > 0)
  }

  fn entry_count(&self, generation: &str) -> Result<u64, CacheStoreError> {
    let conn = self.conn.lock().map_err(|_| CacheStoreError::Poisoned)?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
      params![generation],
      |row| row.get(0),
    )?;
    Ok(count as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> SqliteGenerations {
    SqliteGenerations::open_in_memory().unwrap()
  }

  #[test]
  fn test_put_get_roundtrip() {
    let store = store();
    let request = FetchRequest::get("https://app.test/src/js/app.js");
    let response = FetchResponse::new(200)
      .with_header("Content-Type", "text/javascript")
      .with_body("console.log(1)");

    store.put("v1", &request, &response).unwrap();

    let cached = store.get("v1", &request).unwrap().unwrap();
    assert_eq!(cached, response);
  }

  #[test]
  fn test_get_miss_returns_none() {
    let store = store();
    let request = FetchRequest::get("https://app.test/missing");
    assert!(store.get("v1", &request).unwrap().is_none());
  }

  #[test]
  fn test_put_replaces_existing_entry() {
    let store = store();
    let request = FetchRequest::get("https://app.test/styles.css");

    store
      .put("v1", &request, &FetchResponse::new(200).with_body("old"))
      .unwrap();
    store
      .put("v1", &request, &FetchResponse::new(200).with_body("new"))
      .unwrap();

    let cached = store.get("v1", &request).unwrap().unwrap();
    assert_eq!(cached.body, b"new");
    assert_eq!(store.entry_count("v1").unwrap(), 1);
  }

  #[test]
  fn test_generations_are_isolated() {
    let store = store();
    let request = FetchRequest::get("https://app.test/index.html");
    let response = FetchResponse::new(200).with_body("<html>");

    store.put("v1", &request, &response).unwrap();
    store.put("v2", &request, &response).unwrap();

    assert_eq!(store.generations().unwrap(), vec!["v1", "v2"]);

    assert!(store.delete_generation("v1").unwrap());
    assert_eq!(store.generations().unwrap(), vec!["v2"]);
    assert!(store.get("v2", &request).unwrap().is_some());
    assert!(store.get("v1", &request).unwrap().is_none());
  }

  #[test]
  fn test_delete_absent_generation_returns_false() {
    let store = store();
    assert!(!store.delete_generation("v9").unwrap());
  }
}
