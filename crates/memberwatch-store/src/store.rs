use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::Result;

/// All the ways the storage layer can go wrong
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve a data directory for this platform")]
    NoDataDir,
}

/// Which bucket a value lives in.
///
/// `Synced` holds settings the user expects to follow them around
/// (credentials, notification toggles). `Local` holds volatile
/// machine-local state (the notification list, checkpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Synced,
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Synced => "synced",
            Scope::Local => "local",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal key/value contract the rest of the app programs against.
///
/// Raw values are strings (JSON in practice). Keeping the trait this
/// small makes it trivial to swap the SQLite store for an in-memory
/// double in tests.
pub trait KeyValueStore: Send + Sync {
    fn get_raw(&self, scope: Scope, key: &str) -> Result<Option<String>>;
    fn set_raw(&self, scope: Scope, key: &str, value: &str) -> Result<()>;
    fn remove(&self, scope: Scope, key: &str) -> Result<()>;
}

/// Typed helpers layered on top of the raw contract
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, scope: Scope, key: &str) -> Result<Option<T>> {
        match self.get_raw(scope, key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, scope: Scope, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(scope, key, &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// SQLite-backed store
///
/// One table, `UNIQUE(scope, key)`, schema created on open. SQLite was
/// chosen because it is a zero-config embedded database that survives
/// crashes without us having to think about partial writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the store at the platform data directory
    /// Uses XDG on Linux/macOS, AppData on Windows
    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        debug!("Opening store at {}", path.display());
        Self::open(path)
    }

    /// In-memory database, handy for tests and throwaway runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(data_dir.join("memberwatch").join("store.db"))
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                id INTEGER PRIMARY KEY,
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE(scope, key)
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for SqliteStore {
    fn get_raw(&self, scope: Scope, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                [scope.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, scope: Scope, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO kv (scope, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value",
            [scope.as_str(), key, value],
        )?;
        Ok(())
    }

    fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
            [scope.as_str(), key],
        )?;
        Ok(())
    }
}

/// HashMap-backed store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(Scope, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, scope: Scope, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&(scope, key.to_string())).cloned())
    }

    fn set_raw(&self, scope: Scope, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&(scope, key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.set_raw(Scope::Local, "greeting", "hello").unwrap();
        assert_eq!(
            store.get_raw(Scope::Local, "greeting").unwrap(),
            Some("hello".to_string())
        );

        // Overwrite keeps one row per (scope, key)
        store.set_raw(Scope::Local, "greeting", "bye").unwrap();
        assert_eq!(
            store.get_raw(Scope::Local, "greeting").unwrap(),
            Some("bye".to_string())
        );
    }

    #[test]
    fn test_scopes_do_not_collide() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.set_raw(Scope::Synced, "key", "synced-value").unwrap();
        store.set_raw(Scope::Local, "key", "local-value").unwrap();

        assert_eq!(
            store.get_raw(Scope::Synced, "key").unwrap(),
            Some("synced-value".to_string())
        );
        assert_eq!(
            store.get_raw(Scope::Local, "key").unwrap(),
            Some("local-value".to_string())
        );
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_raw(Scope::Local, "nope").unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new();
        store.set_raw(Scope::Local, "key", "value").unwrap();
        store.remove(Scope::Local, "key").unwrap();
        assert_eq!(store.get_raw(Scope::Local, "key").unwrap(), None);
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();

        store
            .set_json(Scope::Synced, "numbers", &vec![1u32, 2, 3])
            .unwrap();
        let numbers: Option<Vec<u32>> = store.get_json(Scope::Synced, "numbers").unwrap();
        assert_eq!(numbers, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = store.get_json(Scope::Synced, "missing").unwrap();
        assert!(missing.is_none());
    }
}
