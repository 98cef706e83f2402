//! Persistent Cache - durable append-only log of event batches
//!
//! Batches that cannot be delivered right away (capacity eviction, host
//! suspend/terminate) are written here and replayed once the collector is
//! reachable again.
//!
//! ## Structure
//! - `file.rs` - newline-delimited file backend (native platforms)
//! - `kv.rs` - single-key backend over a small key-value store
//!   (sandboxed runtimes, SQLite)
//!
//! Every batch is encoded as one JSON array on its own line, so a crash
//! mid-write can only tear the final line.

pub mod file;
pub mod kv;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants;
use crate::logic::error::TelemetryResult;
use crate::logic::telemetry::{decode_cache_line, encode_cache_line, Event};

pub use file::FileBackend;
pub use kv::{KeyValueBackend, KvStore, MemoryStore, SqliteStore};

// ============================================================================
// BACKEND CONTRACT
// ============================================================================

/// Storage medium behind the cache. Works on raw lines, knows nothing about events.
pub trait CacheBackend: Send {
    /// Durably write one line (newline added by the backend) as a single unit
    fn append_line(&mut self, line: &str) -> TelemetryResult<()>;

    /// Whole stored content, `None` when nothing was ever written
    fn read_raw(&self) -> TelemetryResult<Option<String>>;

    /// Atomically swap the whole content for `content`
    fn replace(&mut self, content: &str) -> TelemetryResult<()>;

    /// Remove everything
    fn clear(&mut self) -> TelemetryResult<()>;

    /// Cheap existence check, does not read the content
    fn has_data(&self) -> TelemetryResult<bool>;

    /// Short description for log lines
    fn describe(&self) -> String;
}

// ============================================================================
// CONFIG
// ============================================================================

/// Backend selection, resolved once when the service is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Append-only text file
    File { path: PathBuf },
    /// Key-value table in a SQLite database
    Sqlite { path: PathBuf },
    /// Process-local key-value map (sandboxed runtimes, tests)
    Memory,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::File {
            path: constants::data_dir().join(constants::CACHE_FILE_NAME),
        }
    }
}

impl CacheConfig {
    /// Build from `TELEMETRY_CACHE_BACKEND` / `TELEMETRY_CACHE_PATH`
    pub fn from_env() -> Self {
        let path = constants::get_cache_path();

        match constants::get_cache_backend().as_str() {
            "memory" => CacheConfig::Memory,
            "sqlite" => CacheConfig::Sqlite {
                path: path.unwrap_or_else(|| constants::data_dir().join(constants::CACHE_DB_NAME)),
            },
            "file" => CacheConfig::File {
                path: path.unwrap_or_else(|| constants::data_dir().join(constants::CACHE_FILE_NAME)),
            },
            other => {
                log::warn!("Unknown cache backend '{}', using file backend", other);
                CacheConfig::File {
                    path: path.unwrap_or_else(|| constants::data_dir().join(constants::CACHE_FILE_NAME)),
                }
            }
        }
    }
}

// ============================================================================
// PERSISTENT CACHE
// ============================================================================

fn stored_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}

pub struct PersistentCache {
    backend: Box<dyn CacheBackend>,
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl PersistentCache {
    /// Open the backend named by the config
    pub fn open(config: &CacheConfig) -> TelemetryResult<Self> {
        let backend: Box<dyn CacheBackend> = match config {
            CacheConfig::File { path } => Box::new(FileBackend::new(path.clone())),
            CacheConfig::Sqlite { path } => {
                Box::new(KeyValueBackend::new(SqliteStore::open(path)?, constants::CACHE_KEY))
            }
            CacheConfig::Memory => {
                Box::new(KeyValueBackend::new(MemoryStore::new(), constants::CACHE_KEY))
            }
        };

        log::info!("Event cache: {}", backend.describe());
        Ok(Self { backend })
    }

    pub fn with_backend(backend: Box<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Write one batch as a new trailing line. Empty batches are not written.
    pub fn append(&mut self, batch: &[Event]) -> TelemetryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let line = encode_cache_line(batch)?;
        self.backend.append_line(&line)?;

        log::debug!("Cached batch of {} events", batch.len());
        Ok(())
    }

    /// Every stored batch in write order. Undecodable lines are skipped.
    pub fn read_all(&self) -> TelemetryResult<Vec<Vec<Event>>> {
        Ok(self.read_all_counted()?.0)
    }

    /// Like [`PersistentCache::read_all`], also returning how many stored
    /// lines were read (unreadable ones included), for [`PersistentCache::remove_front`]
    pub fn read_all_counted(&self) -> TelemetryResult<(Vec<Vec<Event>>, usize)> {
        let raw = match self.backend.read_raw()? {
            Some(raw) => raw,
            None => return Ok((Vec::new(), 0)),
        };

        let mut batches = Vec::new();
        let mut lines = 0;
        let mut skipped = 0;

        for line in stored_lines(&raw) {
            lines += 1;
            match decode_cache_line(line) {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping unreadable cache line: {}", e);
                }
            }
        }

        if skipped > 0 {
            log::warn!("{} cache line(s) could not be decoded", skipped);
        }

        Ok((batches, lines))
    }

    /// Drop the `lines` oldest stored lines, keeping anything appended after them
    pub fn remove_front(&mut self, lines: usize) -> TelemetryResult<()> {
        if lines == 0 {
            return Ok(());
        }

        let raw = match self.backend.read_raw()? {
            Some(raw) => raw,
            None => return Ok(()),
        };

        let rest: Vec<&str> = stored_lines(&raw).skip(lines).collect();
        if rest.is_empty() {
            return self.clear();
        }

        let mut content = rest.join("\n");
        content.push('\n');
        self.backend.replace(&content)?;

        log::debug!("Removed {} delivered cache line(s), {} left", lines, rest.len());
        Ok(())
    }

    /// Remove all batches. Only call once the last `read_all` result is accounted for.
    pub fn clear(&mut self) -> TelemetryResult<()> {
        self.backend.clear()?;
        log::debug!("Event cache cleared");
        Ok(())
    }

    pub fn is_empty(&self) -> TelemetryResult<bool> {
        Ok(!self.backend.has_data()?)
    }

    /// Total events across all batches
    pub fn event_count(&self) -> TelemetryResult<usize> {
        Ok(self.read_all()?.iter().map(Vec::len).sum())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn batch(prefix: &str, n: usize) -> Vec<Event> {
        (0..n).map(|i| Event::new(prefix, format!("{}", i))).collect()
    }

    fn caches(dir: &TempDir) -> Vec<PersistentCache> {
        vec![
            PersistentCache::open(&CacheConfig::File { path: dir.path().join("cache.jsonl") }).unwrap(),
            PersistentCache::open(&CacheConfig::Sqlite { path: dir.path().join("cache.db") }).unwrap(),
            PersistentCache::open(&CacheConfig::Memory).unwrap(),
        ]
    }

    #[test]
    fn test_append_read_preserves_order() {
        let dir = TempDir::new().unwrap();

        for mut cache in caches(&dir) {
            assert!(cache.is_empty().unwrap());

            cache.append(&batch("first", 3)).unwrap();
            cache.append(&batch("second", 2)).unwrap();

            let batches = cache.read_all().unwrap();
            assert_eq!(batches, vec![batch("first", 3), batch("second", 2)], "{:?}", cache);
            assert_eq!(cache.event_count().unwrap(), 5);
            assert!(!cache.is_empty().unwrap());
        }
    }

    #[test]
    fn test_read_does_not_mutate() {
        let dir = TempDir::new().unwrap();

        for mut cache in caches(&dir) {
            cache.append(&batch("a", 1)).unwrap();
            let _ = cache.read_all().unwrap();
            assert_eq!(cache.read_all().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_clear_empties_cache() {
        let dir = TempDir::new().unwrap();

        for mut cache in caches(&dir) {
            cache.append(&batch("a", 4)).unwrap();
            cache.clear().unwrap();

            assert!(cache.is_empty().unwrap());
            assert!(cache.read_all().unwrap().is_empty());

            // clearing twice is harmless
            cache.clear().unwrap();
        }
    }

    #[test]
    fn test_empty_batch_not_written() {
        let mut cache = PersistentCache::open(&CacheConfig::Memory).unwrap();
        cache.append(&[]).unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_torn_line_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.jsonl");
        let mut cache = PersistentCache::open(&CacheConfig::File { path: path.clone() }).unwrap();

        cache.append(&batch("ok", 2)).unwrap();

        // Simulate a crash in the middle of the next write
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("[{\"type\":\"lost\",\"da");
        std::fs::write(&path, content).unwrap();

        assert_eq!(cache.read_all().unwrap(), vec![batch("ok", 2)]);

        // A later append must not be glued onto the torn line
        cache.append(&batch("after", 1)).unwrap();
        assert_eq!(cache.read_all().unwrap(), vec![batch("ok", 2), batch("after", 1)]);
    }

    #[test]
    fn test_remove_front_keeps_later_batches() {
        let dir = TempDir::new().unwrap();

        for mut cache in caches(&dir) {
            cache.append(&batch("old", 2)).unwrap();
            cache.append(&batch("older", 1)).unwrap();
            let (_, lines) = cache.read_all_counted().unwrap();
            assert_eq!(lines, 2);

            cache.append(&batch("new", 3)).unwrap();
            cache.remove_front(lines).unwrap();
            assert_eq!(cache.read_all().unwrap(), vec![batch("new", 3)], "{:?}", cache);

            cache.append(&batch("newer", 1)).unwrap();
            assert_eq!(cache.read_all().unwrap(), vec![batch("new", 3), batch("newer", 1)]);

            cache.remove_front(2).unwrap();
            assert!(cache.is_empty().unwrap());
        }
    }

    #[test]
    fn test_torn_line_counted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.jsonl");
        let mut cache = PersistentCache::open(&CacheConfig::File { path: path.clone() }).unwrap();

        std::fs::write(&path, "[{\"type\":\"lost\",\"da").unwrap();
        cache.append(&batch("ok", 1)).unwrap();

        let (batches, lines) = cache.read_all_counted().unwrap();
        assert_eq!(batches, vec![batch("ok", 1)]);
        assert_eq!(lines, 2);
    }

    #[test]
    fn test_config_serde() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"backend":"sqlite","path":"/tmp/x.db"}"#).unwrap();
        assert_eq!(config, CacheConfig::Sqlite { path: PathBuf::from("/tmp/x.db") });

        let config: CacheConfig = serde_json::from_str(r#"{"backend":"memory"}"#).unwrap();
        assert_eq!(config, CacheConfig::Memory);
    }
}
