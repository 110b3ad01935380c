//! Query executor - connection handling and transactions over SQLite
//!
//! The store talks to its backing engine through this narrow surface:
//! acquire a connection, begin a transaction, run parameterized statements,
//! commit or roll back. Everything above it deals in domain records, never
//! in connection state.

use crate::config::ConnectionConfig;
use crate::Result;
use rusqlite::{Connection, Transaction};
use tracing::debug;

/// An open connection to the embedded SQLite engine.
///
/// One source serves one store handle; concurrent callers each acquire
/// their own source, and SQLite provides the cross-connection concurrency
/// control.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Connect per the given configuration (file-backed or in-memory)
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = match &config.database {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                debug!(database = %path.display(), "opening metadata store");
                Connection::open(path)?
            }
            None => {
                debug!("opening in-memory metadata store");
                Connection::open_in_memory()?
            }
        };
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory source (for testing and scratch stores)
    pub fn open_in_memory() -> Result<Self> {
        Self::connect(&ConnectionConfig::in_memory())
    }

    /// Begin a transaction. Dropping the returned transaction without
    /// committing rolls it back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn.transaction().map_err(Into::into)
    }

    /// Direct access for read-only probes outside a transaction
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Placeholder list for an `IN (...)` clause: `"?,?,?"` for n = 3.
pub(crate) fn in_placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_source() {
        let mut source = SqliteSource::open_in_memory().unwrap();
        let tx = source.transaction().unwrap();
        tx.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
        tx.execute("INSERT INTO t (x) VALUES (1)", []).unwrap();
        tx.commit().unwrap();

        let count: i64 = source
            .connection()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut source = SqliteSource::open_in_memory().unwrap();
        {
            let tx = source.transaction().unwrap();
            tx.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
            tx.commit().unwrap();
        }
        {
            let tx = source.transaction().unwrap();
            tx.execute("INSERT INTO t (x) VALUES (1)", []).unwrap();
            // dropped without commit
        }
        let count: i64 = source
            .connection()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_backed_source_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            ConnectionConfig::with_database(dir.path().join("nested").join("metadata.db"));
        let source = SqliteSource::connect(&config).unwrap();
        drop(source);
        assert!(dir.path().join("nested").join("metadata.db").exists());
    }

    #[test]
    fn test_in_placeholders() {
        assert_eq!(in_placeholders(1), "?");
        assert_eq!(in_placeholders(3), "?,?,?");
    }
}
