//! SQLite persistence: connection pooling, migrations, repositories.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use migrations::{SCHEMA_VERSION, run_migrations};
