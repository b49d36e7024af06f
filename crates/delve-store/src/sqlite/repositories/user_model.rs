//! User model repository — research personalization profiles.
//!
//! The profile body is stored as JSON; id, name, default flag, and creation
//! time are lifted into columns so listing and default lookup stay cheap.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use delve_core::user_model::UserModel;

use crate::errors::{Result, StoreError};

/// User model repository — stateless, every method takes `&Connection`.
pub struct UserModelRepo;

impl UserModelRepo {
    /// Insert or replace a model.
    pub fn upsert(conn: &Connection, model: &UserModel) -> Result<()> {
        let profile = serde_json::to_string(model)?;
        let _ = conn.execute(
            "INSERT INTO user_models (id, name, is_default, created_at, profile)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_default = excluded.is_default,
                profile = excluded.profile",
            params![
                model.id.as_str(),
                model.name,
                model.is_default,
                model.created_at,
                profile
            ],
        )?;
        Ok(())
    }

    /// Get a model by id.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<UserModel>> {
        let profile: Option<String> = conn
            .query_row(
                "SELECT profile FROM user_models WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        profile
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    /// List all models, default first, then by creation time.
    pub fn list(conn: &Connection) -> Result<Vec<UserModel>> {
        let mut stmt = conn.prepare(
            "SELECT profile FROM user_models ORDER BY is_default DESC, created_at ASC",
        )?;
        let profiles = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        profiles
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect()
    }

    /// The default model, if one is set.
    pub fn get_default(conn: &Connection) -> Result<Option<UserModel>> {
        let profile: Option<String> = conn
            .query_row(
                "SELECT profile FROM user_models WHERE is_default = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        profile
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    /// Make `id` the sole default, clearing any previous default in the
    /// same transaction.
    pub fn set_default(conn: &mut Connection, id: &str) -> Result<()> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let _ = tx.execute("UPDATE user_models SET is_default = 0", [])?;
        let changed = tx.execute(
            "UPDATE user_models SET is_default = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            // Rolls back on drop; the previous default survives.
            return Err(StoreError::NotFound(format!("user model {id}")));
        }
        // The stored profile JSON must agree with the columns.
        Self::sync_profile_flags(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a model. Returns `false` when absent.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM user_models WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn sync_profile_flags(conn: &Connection) -> Result<()> {
        let _ = conn.execute(
            "UPDATE user_models SET profile = json_set(profile, '$.is_default', json(
                CASE is_default WHEN 1 THEN 'true' ELSE 'false' END))",
            [],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
