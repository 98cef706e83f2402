//! Key-value cache backend
//!
//! For runtimes without general file access. All batches live in a single
//! string value under one key; appends concatenate, clear deletes the key.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::CacheBackend;
use crate::logic::error::TelemetryResult;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Minimal string key-value store
pub trait KvStore: Send {
    fn get(&self, key: &str) -> TelemetryResult<Option<String>>;

    /// Concatenate `value` onto the stored value (creating it if missing)
    fn append(&mut self, key: &str, value: &str) -> TelemetryResult<()>;

    /// Overwrite the stored value
    fn put(&mut self, key: &str, value: &str) -> TelemetryResult<()>;

    fn delete(&mut self, key: &str) -> TelemetryResult<()>;

    /// Length of the stored value, 0 when missing
    fn value_len(&self, key: &str) -> TelemetryResult<usize>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> TelemetryResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn append(&mut self, key: &str, value: &str) -> TelemetryResult<()> {
        self.values
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_str(value);
        Ok(())
    }

    fn put(&mut self, key: &str, value: &str) -> TelemetryResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> TelemetryResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    fn value_len(&self, key: &str) -> TelemetryResult<usize> {
        Ok(self.values.lock().get(key).map_or(0, String::len))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Single-table key-value store in a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> TelemetryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> TelemetryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> TelemetryResult<Self> {
        conn.execute_batch(
            "
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self { conn })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> TelemetryResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn append(&mut self, key: &str, value: &str) -> TelemetryResult<()> {
        // Single statement, so the concatenation is atomic
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value || excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn put(&mut self, key: &str, value: &str) -> TelemetryResult<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> TelemetryResult<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn value_len(&self, key: &str) -> TelemetryResult<usize> {
        let len: Option<i64> = self
            .conn
            .query_row("SELECT length(value) FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(len.unwrap_or(0).max(0) as usize)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ============================================================================
// BACKEND
// ============================================================================

pub struct KeyValueBackend {
    store: Box<dyn KvStore>,
    key: String,
}

impl KeyValueBackend {
    pub fn new(store: impl KvStore + 'static, key: &str) -> Self {
        Self {
            store: Box::new(store),
            key: key.to_string(),
        }
    }
}

impl CacheBackend for KeyValueBackend {
    fn append_line(&mut self, line: &str) -> TelemetryResult<()> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        self.store.append(&self.key, &record)
    }

    fn read_raw(&self) -> TelemetryResult<Option<String>> {
        self.store.get(&self.key)
    }

    fn replace(&mut self, content: &str) -> TelemetryResult<()> {
        self.store.put(&self.key, content)
    }

    fn clear(&mut self) -> TelemetryResult<()> {
        self.store.delete(&self.key)
    }

    fn has_data(&self) -> TelemetryResult<bool> {
        Ok(self.store.value_len(&self.key)? > 0)
    }

    fn describe(&self) -> String {
        format!("{} key '{}'", self.store.name(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStore::new();
        let mut writer = KeyValueBackend::new(store.clone(), "k");
        let reader = KeyValueBackend::new(store, "k");

        writer.append_line("[1]").unwrap();
        assert!(reader.has_data().unwrap());
        assert_eq!(reader.read_raw().unwrap().as_deref(), Some("[1]\n"));
    }

    #[test]
    fn test_sqlite_append_concatenates() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.value_len("k").unwrap(), 0);

        store.append("k", "a\n").unwrap();
        store.append("k", "b\n").unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("a\nb\n"));
        assert_eq!(store.value_len("k").unwrap(), 4);

        store.put("k", "b\n").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("b\n"));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        {
            let mut backend = KeyValueBackend::new(SqliteStore::open(&path).unwrap(), "cache");
            backend.append_line("[\"x\"]").unwrap();
        }

        let backend = KeyValueBackend::new(SqliteStore::open(&path).unwrap(), "cache");
        assert_eq!(backend.read_raw().unwrap().as_deref(), Some("[\"x\"]\n"));
    }

    #[test]
    fn test_keys_isolated() {
        let store = MemoryStore::new();
        let mut a = KeyValueBackend::new(store.clone(), "a");
        let b = KeyValueBackend::new(store, "b");

        a.append_line("[1]").unwrap();
        assert!(!b.has_data().unwrap());
    }
}
