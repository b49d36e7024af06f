//! Research history repository — one row per session, ordered by recency.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

/// A history entry for the session list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Session key.
    pub session_id: String,
    /// Most recent research run in the session, if any completed a start.
    pub research_id: Option<String>,
    /// The research objective shown in the session list.
    pub query: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last stream or state activity.
    pub last_activity_at: String,
}

/// History repository — stateless, every method takes `&Connection`.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Insert a session or refresh its activity.
    ///
    /// Existing rows keep their `created_at`; the query and research id are
    /// updated so a re-run in the same session shows its latest objective.
    pub fn upsert(
        conn: &Connection,
        session_id: &str,
        research_id: Option<&str>,
        query: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO research_history
                (session_id, research_id, query, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                research_id = excluded.research_id,
                query = excluded.query,
                last_activity_at = excluded.last_activity_at",
            params![session_id, research_id, query, now],
        )?;
        Ok(())
    }

    /// Bump `last_activity_at` without touching the query. Returns `false`
    /// for unknown sessions.
    pub fn touch(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE research_history SET last_activity_at = ?2 WHERE session_id = ?1",
            params![session_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Get a single entry.
    pub fn get(conn: &Connection, session_id: &str) -> Result<Option<HistoryEntry>> {
        Ok(conn
            .query_row(
                "SELECT session_id, research_id, query, created_at, last_activity_at
                 FROM research_history WHERE session_id = ?1",
                params![session_id],
                Self::map_row,
            )
            .optional()?)
    }

    /// List entries, most recently active first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT session_id, research_id, query, created_at, last_activity_at
             FROM research_history
             ORDER BY last_activity_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::map_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete a session's history entry. Returns `false` when absent.
    pub fn delete(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM research_history WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            session_id: row.get(0)?,
            research_id: row.get(1)?,
            query: row.get(2)?,
            created_at: row.get(3)?,
            last_activity_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
