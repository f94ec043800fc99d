//! Durable local story store.
//!
//! SQLite-backed persistence for stories, used both as an offline mirror of
//! network results and as the primary record for stories saved on-device.
//! The store always assigns its own integer key on insert; server-assigned
//! identifiers are never reused as local keys.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::story::types::{GeoPoint, SavedStory, StoryRecord};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("story store error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("invalid story key: {0:?}")]
  InvalidKey(String),

  #[error("story store lock poisoned")]
  Poisoned,

  #[error("could not determine data directory")]
  NoDataDir,
}

/// A key accepted by [`StoryStore::delete`]: either a numeric identifier or
/// its decimal string form.
#[derive(Debug, Clone)]
pub enum StoryKey {
  Id(i64),
  Raw(String),
}

impl From<i64> for StoryKey {
  fn from(id: i64) -> Self {
    StoryKey::Id(id)
  }
}

impl From<&str> for StoryKey {
  fn from(raw: &str) -> Self {
    StoryKey::Raw(raw.to_string())
  }
}

impl From<String> for StoryKey {
  fn from(raw: String) -> Self {
    StoryKey::Raw(raw)
  }
}

impl StoryKey {
  fn resolve(self) -> Result<i64, StoreError> {
    match self {
      StoryKey::Id(id) => Ok(id),
      StoryKey::Raw(raw) => raw
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidKey(raw)),
    }
  }
}

/// Schema for the story table. Secondary indexes on name and description
/// permit duplicate values.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT NOT NULL,
    photo_url TEXT,
    lat REAL,
    lon REAL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stories_name ON stories(name);
CREATE INDEX IF NOT EXISTS idx_stories_description ON stories(description);
"#;

/// SQLite-backed story store.
///
/// Opening is idempotent. A store may also be constructed detached (not yet
/// opened); operations on a detached store are no-ops or empty results
/// rather than errors, so startup code racing the first read/write never
/// crashes on "store not yet open".
pub struct StoryStore {
  conn: Mutex<Option<Connection>>,
}

impl StoryStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self, StoreError> {
    let path = Self::default_path().ok_or(StoreError::NoDataDir)?;
    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      let _ = std::fs::create_dir_all(parent);
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(STORE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(Some(conn)),
    })
  }

  /// Open an in-memory store. Used by tests and as a throwaway fallback.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(STORE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(Some(conn)),
    })
  }

  /// A store that is not backed by anything. All operations are no-ops.
  pub fn detached() -> Self {
    Self {
      conn: Mutex::new(None),
    }
  }

  fn default_path() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("cerita").join("stories.db"))
  }

  /// Insert a story, returning the newly assigned identifier.
  ///
  /// Any server-assigned identifier on the record is ignored; the store
  /// assigns a fresh key and stamps the record with the current time.
  /// Returns `Ok(None)` when the store is detached.
  pub fn insert(&self, record: &StoryRecord) -> Result<Option<i64>, StoreError> {
    let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let conn = match guard.as_ref() {
      Some(conn) => conn,
      None => return Ok(None),
    };

    let timestamp = Utc::now().timestamp_millis();
    let (lat, lon) = match record.location {
      Some(point) => (Some(point.lat), Some(point.lon)),
      None => (None, None),
    };

    conn.execute(
      "INSERT INTO stories (name, description, photo_url, lat, lon, timestamp)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        record.name,
        record.description,
        record.photo_url,
        lat,
        lon,
        timestamp
      ],
    )?;

    Ok(Some(conn.last_insert_rowid()))
  }

  /// All stored stories, in insertion order. An empty store yields an empty
  /// list, not an error.
  pub fn list(&self) -> Result<Vec<SavedStory>, StoreError> {
    let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let conn = match guard.as_ref() {
      Some(conn) => conn,
      None => return Ok(Vec::new()),
    };

    let mut stmt = conn.prepare(
      "SELECT id, name, description, photo_url, lat, lon, timestamp
       FROM stories ORDER BY id",
    )?;

    let rows = stmt.query_map([], |row| {
      let lat: Option<f64> = row.get(4)?;
      let lon: Option<f64> = row.get(5)?;
      Ok(SavedStory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        photo_url: row.get(3)?,
        location: match (lat, lon) {
          (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
          _ => None,
        },
        timestamp: row.get(6)?,
      })
    })?;

    let mut stories = Vec::new();
    for row in rows {
      stories.push(row?);
    }
    Ok(stories)
  }

  /// Delete a story by key. Deleting an absent key is not an error.
  pub fn delete(&self, key: impl Into<StoryKey>) -> Result<(), StoreError> {
    let id = key.into().resolve()?;

    let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let conn = match guard.as_ref() {
      Some(conn) => conn,
      None => return Ok(()),
    };

    conn.execute("DELETE FROM stories WHERE id = ?", params![id])?;
    Ok(())
  }

  /// Number of stored stories.
  pub fn count(&self) -> Result<u64, StoreError> {
    let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let conn = match guard.as_ref() {
      Some(conn) => conn,
      None => return Ok(0),
    };

    let count: Option<i64> = conn
      .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))
      .optional()?;
    Ok(count.unwrap_or(0) as u64)
  }
}
