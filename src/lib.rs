//! # crate-store - Typed local persistence
//!
//! Stores caller-defined records in a single SQLite file, one table per
//! record type, with each record serialized to JSON.
//!
//! crate-store provides:
//! - A `Record` contract: a stable string id plus a table name
//! - `Store<T>`: get/put/remove by id, and bulk get/replace/remove by tag
//! - `Database`: a shared connection handle that creates tables lazily and
//!   wipes every table when the schema version is bumped
//! - TOML configuration and `tracing` subscriber setup

pub mod record;
pub mod storage;
pub mod config;
pub mod logging;

// Re-exports for convenient access
pub use record::Record;
pub use storage::{Database, ReplaceOutcome, Store, StoreStats, SCHEMA_VERSION};
pub use config::StoreConfig;

/// Result type alias for crate-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for crate-store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database schema version {found} is newer than supported version {supported}")]
    VersionDowngrade { found: u32, supported: u32 },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Reject empty identifiers and tags before any statement is prepared.
pub(crate) fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(())
}
