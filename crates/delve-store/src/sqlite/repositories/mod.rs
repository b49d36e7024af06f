//! Repositories over the snapshot cache schema.
//!
//! Repositories are stateless; callers check a connection out of the pool
//! and pass it in, so multi-repo operations can share one transaction.

pub mod history;
pub mod snapshot;
pub mod user_model;

pub use history::{HistoryEntry, HistoryRepo};
pub use snapshot::{SnapshotRepo, SnapshotRow, WriteOutcome};
pub use user_model::UserModelRepo;
