//! SQLite-backed shared store.
//!
//! Every process that opens the same database file is one execution context.
//! Rows carry a global version number and the id of the context that wrote
//! them, which is enough to build a change feed by polling: a context reports
//! every row whose version is newer than the last one it saw and whose writer
//! is somebody else. Removals are tombstones (`value IS NULL`) so they show up
//! in the feed too.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{data_dir, SharedStore, StorageEvent};
use crate::error::StoreError;

/// How long a writer waits on another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct FeedCursor {
    last_version: i64,
    /// Last value this context knows for each key, used as `old_value`.
    known: HashMap<String, Option<String>>,
}

/// SQLite key/value store with a polled change feed.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    id: String,
    cursor: Mutex<FeedCursor>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("id", &self.id).finish()
    }
}

impl SqliteStore {
    /// Open `<data_dir>/<file_name>`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default(file_name: &str) -> crate::error::Result<Self> {
        let dir = data_dir()?;
        Ok(Self::open(dir.join(file_name))?)
    }

    /// Open (creating if needed) the store at `path` as a new context.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory store (for tests).
    ///
    /// Further contexts on the same data come from [`SqliteStore::attach`].
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            id: uuid::Uuid::new_v4().to_string(),
            cursor: Mutex::new(FeedCursor::default()),
        };
        store.seed_cursor()?;
        Ok(store)
    }

    /// Another context sharing this store's connection.
    ///
    /// # Errors
    /// Returns an error if the current store contents cannot be read.
    pub fn attach(&self) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::clone(&self.conn),
            id: uuid::Uuid::new_v4().to_string(),
            cursor: Mutex::new(FeedCursor::default()),
        };
        store.seed_cursor()?;
        Ok(store)
    }

    /// Start the feed at the present: existing rows are state, not changes.
    fn seed_cursor(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let mut stmt = conn.prepare("SELECT key, value, version FROM kv")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut cursor = self.cursor.lock().map_err(|_| StoreError::Locked)?;
        for row in rows {
            let (key, value, version) = row?;
            cursor.last_version = cursor.last_version.max(version);
            cursor.known.insert(key, value);
        }
        Ok(())
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let tx = conn.transaction()?;
        let current: Option<Option<String>> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        let unchanged = match &current {
            Some(existing) => existing.as_deref() == value,
            None => value.is_none(),
        };
        if unchanged {
            return Ok(());
        }
        let version: i64 = tx.query_row("SELECT COALESCE(MAX(version), 0) + 1 FROM kv", [], |row| {
            row.get(0)
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value, version, writer) VALUES (?1, ?2, ?3, ?4)",
            params![key, value, version, self.id],
        )?;
        tx.commit()?;

        if let Ok(mut cursor) = self.cursor.lock() {
            cursor.known.insert(key.to_string(), value.map(str::to_string));
        }
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key     TEXT PRIMARY KEY,
            value   TEXT,
            version INTEGER NOT NULL,
            writer  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_kv_version ON kv(version);",
    )
}

impl SharedStore for SqliteStore {
    fn context_id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let value: Option<Option<String>> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write(key, None)
    }

    fn drain_changes(&self) -> Result<Vec<StorageEvent>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let mut cursor = self.cursor.lock().map_err(|_| StoreError::Locked)?;

        let mut stmt = conn.prepare(
            "SELECT key, value, version, writer FROM kv WHERE version > ?1 ORDER BY version",
        )?;
        let rows = stmt.query_map(params![cursor.last_version], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (key, value, version, writer) = row?;
            cursor.last_version = cursor.last_version.max(version);
            if writer == self.id {
                continue;
            }
            let old_value = cursor.known.insert(key.clone(), value.clone()).flatten();
            if old_value == value {
                continue;
            }
            events.push(StorageEvent {
                key,
                old_value,
                new_value: value,
            });
        }
        Ok(events)
    }
}
