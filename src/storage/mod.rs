//! Storage Layer - SQLite-backed persistence
//!
//! One SQLite file holds one table per record type:
//! - `<table>(ID TEXT PRIMARY KEY, ITEM TEXT, TAG TEXT)`
//!
//! `ITEM` holds the record serialized as JSON; `TAG` is an optional label
//! used for bulk reads, replacement and removal.

pub mod database;
pub mod schema;
pub mod store;

pub use database::{Database, StoreStats, TableStats};
pub use schema::SCHEMA_VERSION;
pub use store::{ReplaceOutcome, Store};
