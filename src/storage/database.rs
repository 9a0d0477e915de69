//! Shared database handle
//!
//! A `Database` owns the single SQLite connection used by every store opened
//! on it, plus the set of tables already created through it. Clone the handle
//! to share it between stores; the connection closes when the last clone is
//! dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use super::schema;
use crate::config::StoreConfig;
use crate::record::validate_table_name;
use crate::{Error, Result};

/// Cloneable handle to one SQLite database file
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    /// Tables created through this handle. Locked before `conn` whenever both are held.
    ready_tables: Mutex<HashSet<String>>,
    path: Option<PathBuf>,
    schema_version: u32,
    log_operations: bool,
}

impl Database {
    /// Open a database file (creates it and its directory if missing)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_version(path, schema::SCHEMA_VERSION)
    }

    /// Open a database file, enforcing a specific schema version.
    ///
    /// If the file was written with an older version, every table in it is
    /// dropped before the new version is recorded.
    pub fn open_with_version(path: impl AsRef<Path>, version: u32) -> Result<Self> {
        Self::open_file(path.as_ref(), version, true)
    }

    /// Open the database described by a configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open_file(&config.database, config.schema_version, config.log_operations)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, schema::SCHEMA_VERSION, true)
    }

    fn open_file(path: &Path, version: u32, log_operations: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()), version, log_operations)
    }

    fn from_connection(
        mut conn: Connection,
        path: Option<PathBuf>,
        version: u32,
        log_operations: bool,
    ) -> Result<Self> {
        if version == 0 {
            return Err(Error::InvalidArgument("schema version must be at least 1".to_string()));
        }
        apply_schema_version(&mut conn, version)?;

        if log_operations {
            tracing::debug!(path = ?path, version, "Opened database");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                ready_tables: Mutex::new(HashSet::new()),
                path,
                schema_version: version,
                log_operations,
            }),
        })
    }

    /// Path of the backing file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Schema version this handle enforces
    pub fn schema_version(&self) -> u32 {
        self.inner.schema_version
    }

    /// Whether stores on this handle emit debug records for each operation
    pub fn log_operations(&self) -> bool {
        self.inner.log_operations
    }

    /// Lock the shared connection for the duration of one operation
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    fn lock_ready_tables(&self) -> Result<MutexGuard<'_, HashSet<String>>> {
        self.inner.ready_tables.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Create a record table unless this handle already did
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;

        let mut ready = self.lock_ready_tables()?;
        if ready.contains(table) {
            return Ok(());
        }

        let conn = self.lock()?;
        conn.execute(&schema::create_table(table), [])?;
        ready.insert(table.to_string());

        if self.log_operations() {
            tracing::debug!(table, "Table ready");
        }
        Ok(())
    }

    /// Lock the connection for an operation on `table`, creating the table
    /// first if it is missing.
    ///
    /// Another handle on the same file may have dropped the table since this
    /// handle last created it, so the idempotent create runs on every call.
    pub(crate) fn lock_table(&self, table: &str) -> Result<MutexGuard<'_, Connection>> {
        let mut ready = self.lock_ready_tables()?;
        let conn = self.lock()?;
        conn.execute(&schema::create_table(table), [])?;
        if ready.insert(table.to_string()) && self.log_operations() {
            tracing::debug!(table, "Table ready");
        }
        Ok(conn)
    }

    /// Forget that a table was created; the next use re-runs creation.
    /// Returns whether the table was known to this handle.
    pub fn release_table(&self, table: &str) -> Result<bool> {
        Ok(self.lock_ready_tables()?.remove(table))
    }

    /// Names of every table in the database, sorted
    pub fn tables(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        list_tables(&conn)
    }

    /// Drop every table in the database. Returns how many were dropped.
    pub fn drop_all_tables(&self) -> Result<usize> {
        let mut ready = self.lock_ready_tables()?;
        let mut conn = self.lock()?;

        let tx = conn.transaction()?;
        let dropped = drop_tables(&tx)?;
        tx.commit()?;
        ready.clear();

        tracing::info!(count = dropped.len(), "Dropped all tables");
        Ok(dropped.len())
    }

    /// Row counts for every table
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let mut tables = Vec::new();
        for name in list_tables(&conn)? {
            let rows: i64 = conn.query_row(&schema::count_all(&name), [], |row| row.get(0))?;
            tables.push(TableStats { name, rows: rows as usize });
        }
        Ok(StoreStats {
            schema_version: self.schema_version(),
            tables,
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("schema_version", &self.inner.schema_version)
            .finish_non_exhaustive()
    }
}

/// Bring the file to `version`: fresh files are stamped, older files are
/// wiped, newer files are refused.
fn apply_schema_version(conn: &mut Connection, version: u32) -> Result<()> {
    let found: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if found == version {
        return Ok(());
    }
    if found > version {
        return Err(Error::VersionDowngrade {
            found,
            supported: version,
        });
    }

    let tx = conn.transaction()?;
    if found != 0 {
        let dropped = drop_tables(&tx)?;
        tracing::info!(from = found, to = version, dropped = dropped.len(), "Schema version bumped, dropped all tables");
    }
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;
    Ok(())
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(schema::LIST_TABLES)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn drop_tables(conn: &Connection) -> Result<Vec<String>> {
    let names = list_tables(conn)?;
    for name in &names {
        conn.execute(&schema::drop_table(name), [])?;
    }
    Ok(names)
}

/// Per-table row count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub rows: usize,
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub schema_version: u32,
    pub tables: Vec<TableStats>,
}

impl StoreStats {
    /// Total rows across all tables
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Schema version: {}", self.schema_version)?;
        for table in &self.tables {
            writeln!(f, "  {}: {}", table.name, table.rows)?;
        }
        write!(f, "  Total rows: {}", self.total_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user_version(path: &Path) -> u32 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_fresh_file_is_stamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("crate.db");

        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
        drop(db);

        assert_eq!(user_version(&path), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_table("contacts").unwrap();
        db.ensure_table("contacts").unwrap();
        db.ensure_table("notes").unwrap();

        assert_eq!(db.tables().unwrap(), vec!["contacts".to_string(), "notes".to_string()]);
    }

    #[test]
    fn test_ensure_table_rejects_bad_name() {
        let db = Database::open_in_memory().unwrap();
        let err = db.ensure_table("bad name").unwrap_err();
        assert!(matches!(err, Error::InvalidTableName(_)));
        assert!(db.tables().unwrap().is_empty());
    }

    #[test]
    fn test_same_version_keeps_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate.db");

        let db = Database::open(&path).unwrap();
        db.ensure_table("contacts").unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.tables().unwrap(), vec!["contacts".to_string()]);
    }

    #[test]
    fn test_version_bump_drops_every_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate.db");

        let db = Database::open_with_version(&path, 1).unwrap();
        db.ensure_table("contacts").unwrap();
        db.ensure_table("notes").unwrap();
        drop(db);

        let db = Database::open_with_version(&path, 2).unwrap();
        assert!(db.tables().unwrap().is_empty());
        drop(db);

        assert_eq!(user_version(&path), 2);
    }

    #[test]
    fn test_version_downgrade_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate.db");

        drop(Database::open_with_version(&path, 3).unwrap());

        let err = Database::open_with_version(&path, 2).unwrap_err();
        assert!(matches!(err, Error::VersionDowngrade { found: 3, supported: 2 }));
    }

    #[test]
    fn test_version_zero_is_invalid() {
        let err = Database::open_with_version(":memory:", 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_drop_all_tables_resets_ready_set() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_table("contacts").unwrap();
        db.ensure_table("notes").unwrap();

        assert_eq!(db.drop_all_tables().unwrap(), 2);
        assert!(db.tables().unwrap().is_empty());

        db.ensure_table("contacts").unwrap();
        assert_eq!(db.tables().unwrap(), vec!["contacts".to_string()]);
    }

    #[test]
    fn test_release_table() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_table("contacts").unwrap();

        assert!(db.release_table("contacts").unwrap());
        assert!(!db.release_table("contacts").unwrap());
    }

    #[test]
    fn test_stats() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_table("contacts").unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute("INSERT INTO contacts (ID, ITEM) VALUES ('a', '{}')", []).unwrap();
            conn.execute("INSERT INTO contacts (ID, ITEM) VALUES ('b', '{}')", []).unwrap();
        }

        let stats = db.stats().unwrap();
        assert_eq!(stats.tables, vec![TableStats { name: "contacts".to_string(), rows: 2 }]);
        assert_eq!(stats.total_rows(), 2);
        assert!(stats.to_string().contains("contacts: 2"));
    }
}
