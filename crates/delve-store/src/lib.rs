//! Research state persistence.
//!
//! Two stores, one write path:
//!
//! - a local SQLite snapshot cache (`sqlite`) holding one versioned row per
//!   (session, client) plus session history and user models,
//! - the remote research store (`remote`) reached over HTTP.
//!
//! [`StateService`] coordinates both: writes land locally first and are
//! pushed to the backend; reads prefer the backend but resolve against the
//! cache by last-writer-wins on `updated_at`, so the client keeps working
//! through backend outages.

#![deny(unsafe_code)]

pub mod errors;
pub mod remote;
pub mod service;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use remote::{ApprovalResponse, RemoteStore};
pub use service::StateService;
pub use sqlite::{ConnectionConfig, ConnectionPool};

use std::path::PathBuf;

use delve_settings::types::DelveSettings;

/// Resolve the cache database path: configured path, or `~/.delve/delve.db`.
#[must_use]
pub fn resolve_db_path(settings: &DelveSettings) -> PathBuf {
    settings.storage.db_path.clone().unwrap_or_else(|| {
        let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
        home.join(".delve").join("delve.db")
    })
}

/// Open the cache database from settings and run migrations.
pub fn open_pool(settings: &DelveSettings) -> Result<ConnectionPool> {
    let path = resolve_db_path(settings);
    let pool = sqlite::connection::new_file(&path, &ConnectionConfig::default())?;
    let conn = pool.get()?;
    sqlite::run_migrations(&conn)?;
    Ok(pool)
}
