//! Snapshot repository — the local research-state cache.
//!
//! One row per (session_id, client_id): a versioned JSON snapshot of
//! [`ResearchState`] with a last-writer-wins guard on `updated_at`. A write
//! from one client can never clobber another client's row, and the newest
//! write for a session wins at read time.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use delve_core::state::ResearchState;

use crate::errors::{Result, StoreError};

/// A cached snapshot row.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotRow {
    /// Session key.
    pub session_id: String,
    /// Client key.
    pub client_id: String,
    /// Research run the snapshot belongs to.
    pub research_id: String,
    /// Monotonic per-row version, incremented on every accepted write.
    pub version: i64,
    /// RFC 3339 timestamp of the snapshot.
    pub updated_at: String,
    /// Whether the remote store has confirmed this snapshot.
    pub synced: bool,
    /// The snapshot itself.
    pub state: ResearchState,
}

/// Whether timestamp `a` is strictly newer than `b`.
///
/// Timestamps are RFC 3339; rows written by older builds may carry
/// unparseable values, which fall back to lexicographic comparison
/// (correct for same-offset RFC 3339).
#[must_use]
pub fn is_newer(a: &str, b: &str) -> bool {
    use chrono::DateTime;
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a > b,
        _ => a > b,
    }
}

/// Outcome of a snapshot write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new row was inserted.
    Inserted,
    /// The existing row was replaced (incoming was newer or equal).
    Updated,
    /// The existing row was newer; the write was dropped.
    StaleDropped,
}

/// Snapshot repository — stateless, every method takes `&Connection`.
pub struct SnapshotRepo;

impl SnapshotRepo {
    /// Insert or update the snapshot for (session, client).
    ///
    /// Last-writer-wins: an incoming snapshot older than the stored row is
    /// dropped (logged, not an error). Accepted writes increment `version`.
    pub fn upsert(conn: &Connection, state: &ResearchState, synced: bool) -> Result<WriteOutcome> {
        let session_id = state.identity.session_id.as_str();
        let client_id = state.identity.client_id.as_str();

        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, updated_at FROM snapshots
                 WHERE session_id = ?1 AND client_id = ?2",
                params![session_id, client_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let json = serde_json::to_string(state)?;

        match existing {
            None => {
                let _ = conn.execute(
                    "INSERT INTO snapshots
                        (session_id, client_id, research_id, version, updated_at, synced, state)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
                    params![
                        session_id,
                        client_id,
                        state.identity.research_id.as_str(),
                        state.updated_at,
                        synced,
                        json
                    ],
                )?;
                Ok(WriteOutcome::Inserted)
            }
            Some((version, stored_at)) => {
                if is_newer(&stored_at, &state.updated_at) {
                    debug!(
                        session_id,
                        client_id,
                        stored_at,
                        incoming_at = state.updated_at,
                        "dropping stale snapshot write"
                    );
                    return Ok(WriteOutcome::StaleDropped);
                }
                let _ = conn.execute(
                    "UPDATE snapshots
                     SET research_id = ?3, version = ?4, updated_at = ?5, synced = ?6, state = ?7
                     WHERE session_id = ?1 AND client_id = ?2",
                    params![
                        session_id,
                        client_id,
                        state.identity.research_id.as_str(),
                        version + 1,
                        state.updated_at,
                        synced,
                        json
                    ],
                )?;
                Ok(WriteOutcome::Updated)
            }
        }
    }

    /// Get the snapshot for a specific (session, client).
    pub fn get(
        conn: &Connection,
        session_id: &str,
        client_id: &str,
    ) -> Result<Option<SnapshotRow>> {
        conn.query_row(
            "SELECT session_id, client_id, research_id, version, updated_at, synced, state
             FROM snapshots WHERE session_id = ?1 AND client_id = ?2",
            params![session_id, client_id],
            Self::map_row,
        )
        .optional()?
        .transpose()
    }

    /// Get the newest snapshot for a session across all clients
    /// (last-writer-wins resolution).
    pub fn latest_for_session(conn: &Connection, session_id: &str) -> Result<Option<SnapshotRow>> {
        let mut stmt = conn.prepare(
            "SELECT session_id, client_id, research_id, version, updated_at, synced, state
             FROM snapshots WHERE session_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut best: Option<SnapshotRow> = None;
        for row in rows {
            let row = row?;
            match &best {
                Some(b) if !is_newer(&row.updated_at, &b.updated_at) => {}
                _ => best = Some(row),
            }
        }
        Ok(best)
    }

    /// Mark the (session, client) row as confirmed by the remote store.
    pub fn mark_synced(conn: &Connection, session_id: &str, client_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE snapshots SET synced = 1 WHERE session_id = ?1 AND client_id = ?2",
            params![session_id, client_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete all snapshots for a session. Returns the number deleted.
    pub fn delete_for_session(conn: &Connection, session_id: &str) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM snapshots WHERE session_id = ?1",
            params![session_id],
        )?)
    }

    /// Count stored snapshots.
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<SnapshotRow>> {
        let json: String = row.get(6)?;
        Ok((|| {
            Ok(SnapshotRow {
                session_id: row.get(0)?,
                client_id: row.get(1)?,
                research_id: row.get(2)?,
                version: row.get(3)?,
                updated_at: row.get(4)?,
                synced: row.get(5)?,
                state: serde_json::from_str(&json).map_err(StoreError::from)?,
            })
        })())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
