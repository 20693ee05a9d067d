use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Key-value text storage the study state is persisted through.
///
/// Both directions are fallible; callers decide how to recover.
pub trait BlobStore {
    /// Read the value stored under `key`, `None` if it was never written
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let store = SqliteStore { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let store = SqliteStore { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }
}

impl BlobStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read '{}' from database", key))?;

        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("Failed to write '{}' to database", key))?;

        Ok(())
    }
}

/// In-memory store for tests, with switchable read/write failures
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub entries: std::collections::HashMap<String, String>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::default();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }
}

#[cfg(test)]
impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads {
            anyhow::bail!("simulated read failure");
        }
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("simulated quota exceeded");
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_key_reads_none() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cards.db")).unwrap();
        assert_eq!(store.read("nothing-here").unwrap(), None);
    }

    #[test]
    fn test_write_overwrites_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.write("state", "first").unwrap();
            store.write("state", "second").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read("state").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.write("state", "{}").unwrap();
        assert_eq!(store.read("state").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_open_fails_for_directory_path() {
        let dir = tempdir().unwrap();
        assert!(SqliteStore::open(dir.path()).is_err());
    }

    #[test]
    fn test_memory_store_failures() {
        let mut store = MemoryStore::default();
        store.write("k", "v").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));

        store.fail_reads = true;
        store.fail_writes = true;
        assert!(store.read("k").is_err());
        assert!(store.write("k", "w").is_err());
    }
}
