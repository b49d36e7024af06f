//! SQLite connection pooling.
//!
//! Wraps `r2d2_sqlite` with the pragmas the cache relies on: WAL for
//! concurrent readers, foreign keys on, and a busy timeout so short write
//! contention resolves inside SQLite instead of surfacing as errors.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::Result;

/// Pool of SQLite connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// A checked-out connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool configuration.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub max_size: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

fn manager_with_pragmas(
    manager: SqliteConnectionManager,
    busy_timeout_ms: u64,
) -> SqliteConnectionManager {
    manager.with_init(move |conn| {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
    })
}

/// Open a pool backed by a database file, creating parent directories.
pub fn new_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let manager = manager_with_pragmas(SqliteConnectionManager::file(path), config.busy_timeout_ms);
    Ok(r2d2::Pool::builder()
        .max_size(config.max_size)
        .build(manager)?)
}

/// Open an in-memory pool (tests).
///
/// In-memory databases are per-connection, so the pool is capped at a
/// single connection to keep all callers on the same database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = manager_with_pragmas(SqliteConnectionManager::memory(), config.busy_timeout_ms);
    Ok(r2d2::Pool::builder().max_size(1).build(manager)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
