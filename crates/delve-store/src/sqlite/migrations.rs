//! Schema migrations, tracked via `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
///
/// Idempotent: connections at the current version return immediately.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!(from = version, to = SCHEMA_VERSION, "database migrated");
    Ok(())
}

/// v1: snapshots, research history, user models.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            session_id   TEXT NOT NULL,
            client_id    TEXT NOT NULL,
            research_id  TEXT NOT NULL,
            version      INTEGER NOT NULL DEFAULT 1,
            updated_at   TEXT NOT NULL,
            synced       INTEGER NOT NULL DEFAULT 0,
            state        TEXT NOT NULL,
            PRIMARY KEY (session_id, client_id)
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_session_updated
            ON snapshots (session_id, updated_at DESC);

        CREATE TABLE IF NOT EXISTS research_history (
            session_id        TEXT PRIMARY KEY,
            research_id       TEXT,
            query             TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            last_activity_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_activity
            ON research_history (last_activity_at DESC);

        CREATE TABLE IF NOT EXISTS user_models (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            is_default  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            profile     TEXT NOT NULL
        );",
    )?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
