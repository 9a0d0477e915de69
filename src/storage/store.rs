//! Typed record store over one table
//!
//! Reads never fail on bad data: a stored payload that no longer decodes is
//! logged and treated as missing (point lookups) or skipped (list lookups).
//! Writes that touch more than one row run inside a single transaction.

use std::marker::PhantomData;
use std::sync::MutexGuard;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use super::database::Database;
use super::schema;
use crate::record::Record;
use crate::{require_non_empty, Result};

/// Emit a debug record tagged with the store's table, when the database
/// handle has operation logging enabled.
macro_rules! op_debug {
    ($store:expr, $($arg:tt)+) => {
        if $store.db.log_operations() {
            tracing::debug!(table = %$store.table, $($arg)+);
        }
    };
}

type SaveHook<T> = Box<dyn Fn(&T) -> T + Send + Sync>;

/// Persistent collection of `T` records backed by one table
pub struct Store<T> {
    db: Database,
    table: String,
    before_save: Option<SaveHook<T>>,
    _record: PhantomData<fn() -> T>,
}

/// Rows affected by a tag replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Rows that carried the tag before the replacement
    pub removed: usize,
    /// Records stored under the tag by the replacement
    pub stored: usize,
}

impl<T> Store<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    /// Open the store for `T` in its own table (`T::TABLE`)
    pub fn new(db: &Database) -> Result<Self> {
        Self::with_table(db, T::TABLE)
    }

    /// Open a store for `T` in an explicitly named table
    pub fn with_table(db: &Database, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        db.ensure_table(&table)?;

        Ok(Self {
            db: db.clone(),
            table,
            before_save: None,
            _record: PhantomData,
        })
    }

    /// Install a hook that edits a copy of every record right before it is
    /// serialized, e.g. to clear secrets. The caller's value is left as is.
    pub fn before_save<F>(mut self, hook: F) -> Self
    where
        T: Clone + 'static,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.before_save = Some(Box::new(move |item: &T| {
            let mut copy = item.clone();
            hook(&mut copy);
            copy
        }));
        self
    }

    /// Name of the backing table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Database handle this store writes to
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock_table(&self.table)
    }

    /// Run the save hook and serialize, yielding `(id, json)` for the row.
    fn prepare(&self, item: &T) -> Result<(String, String)> {
        let (id, json) = match &self.before_save {
            Some(hook) => {
                let scrubbed = hook(item);
                (scrubbed.id().to_string(), serde_json::to_string(&scrubbed)?)
            }
            None => (item.id().to_string(), serde_json::to_string(item)?),
        };
        require_non_empty(&id, "item id")?;
        Ok((id, json))
    }

    fn decode(&self, id: &str, payload: Option<String>) -> Option<T> {
        let Some(json) = payload else {
            tracing::error!(table = %self.table, id, "Stored item has no payload");
            return None;
        };

        match serde_json::from_str(&json) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::error!(table = %self.table, id, error = %err, "Failed to read item");
                None
            }
        }
    }

    fn query_rows<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<T>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, payload)| self.decode(&id, payload))
            .collect())
    }

    // ========== Reads ==========

    /// Get a record by id. `None` if absent or if the stored payload is unreadable.
    pub fn get(&self, id: &str) -> Result<Option<T>> {
        require_non_empty(id, "id")?;

        let payload: Option<Option<String>> = {
            let conn = self.connection()?;
            conn.query_row(&schema::select_item_by_id(&self.table), [id], |row| row.get(0))
                .optional()?
        };

        match payload {
            Some(payload) => {
                let item = self.decode(id, payload);
                if item.is_some() {
                    op_debug!(self, id, "Retrieved item");
                }
                Ok(item)
            }
            None => {
                op_debug!(self, id, "No item with id");
                Ok(None)
            }
        }
    }

    /// Check whether a row with this id exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        require_non_empty(id, "id")?;

        let conn = self.connection()?;
        let found = conn
            .query_row(&schema::select_exists_by_id(&self.table), [id], |_| Ok(()))
            .optional()?
            .is_some();

        op_debug!(self, id, found, "Checked item exists");
        Ok(found)
    }

    /// All records carrying a tag, in no particular order
    pub fn get_by_tag(&self, tag: &str) -> Result<Vec<T>> {
        require_non_empty(tag, "tag")?;

        let items = self.query_rows(&schema::select_items_by_tag(&self.table), [tag])?;
        op_debug!(self, tag, count = items.len(), "Retrieved items with tag");
        Ok(items)
    }

    /// Any one record carrying a tag
    pub fn get_first_by_tag(&self, tag: &str) -> Result<Option<T>> {
        require_non_empty(tag, "tag")?;

        let item = self
            .query_rows(&schema::select_first_item_by_tag(&self.table), [tag])?
            .into_iter()
            .next();
        op_debug!(self, tag, found = item.is_some(), "Retrieved first item with tag");
        Ok(item)
    }

    /// Every record in the table, in no particular order
    pub fn get_all(&self) -> Result<Vec<T>> {
        let items = self.query_rows(&schema::select_all_items(&self.table), [])?;
        op_debug!(self, count = items.len(), "Retrieved all items");
        Ok(items)
    }

    /// Number of rows in the table
    pub fn count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&schema::count_all(&self.table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of rows carrying a tag
    pub fn count_by_tag(&self, tag: &str) -> Result<usize> {
        require_non_empty(tag, "tag")?;

        let conn = self.connection()?;
        let count: i64 =
            conn.query_row(&schema::count_by_tag(&self.table), [tag], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Writes ==========

    /// Insert or update a record.
    ///
    /// With `tag: None` an existing row keeps its current tag; with
    /// `Some(tag)` the row is (re)tagged.
    pub fn put(&self, item: &T, tag: Option<&str>) -> Result<()> {
        if let Some(tag) = tag {
            require_non_empty(tag, "tag")?;
        }
        let (id, json) = self.prepare(item)?;

        let conn = self.connection()?;
        conn.execute(&schema::upsert(&self.table), params![id, json, tag])?;

        op_debug!(self, id = %id, tag = ?tag, "Stored item");
        Ok(())
    }

    /// Insert or update many records in one transaction. Nothing is written
    /// if any record is invalid or any statement fails.
    pub fn put_many<'a, I>(&self, items: I, tag: Option<&str>) -> Result<usize>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        if let Some(tag) = tag {
            require_non_empty(tag, "tag")?;
        }
        let rows = items
            .into_iter()
            .map(|item| self.prepare(item))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        upsert_rows(&tx, &self.table, &rows, tag)?;
        tx.commit()?;

        op_debug!(self, count = rows.len(), tag = ?tag, "Stored items");
        Ok(rows.len())
    }

    /// Make `item` the only record under `tag`
    pub fn replace(&self, tag: &str, item: &T) -> Result<ReplaceOutcome> {
        self.replace_many(tag, std::iter::once(item))
    }

    /// Make `items` exactly the records under `tag`. Rows under other tags
    /// are untouched, unless one of `items` shares their id, in which case
    /// that row moves to `tag`.
    pub fn replace_many<'a, I>(&self, tag: &str, items: I) -> Result<ReplaceOutcome>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        require_non_empty(tag, "tag")?;
        let rows = items
            .into_iter()
            .map(|item| self.prepare(item))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(&schema::delete_by_tag(&self.table), [tag])?;
        upsert_rows(&tx, &self.table, &rows, Some(tag))?;
        tx.commit()?;

        op_debug!(self, tag, removed, stored = rows.len(), "Replaced items with tag");
        Ok(ReplaceOutcome {
            removed,
            stored: rows.len(),
        })
    }

    /// Remove the record with this id. Returns whether a row was deleted.
    pub fn remove_by_id(&self, id: &str) -> Result<bool> {
        require_non_empty(id, "id")?;

        let conn = self.connection()?;
        let removed = conn.execute(&schema::delete_by_id(&self.table), [id])? > 0;

        if removed {
            op_debug!(self, id, "Removed item");
        } else {
            op_debug!(self, id, "No item to remove");
        }
        Ok(removed)
    }

    /// Remove every record carrying a tag. Returns how many were deleted.
    pub fn remove_by_tag(&self, tag: &str) -> Result<usize> {
        require_non_empty(tag, "tag")?;

        let conn = self.connection()?;
        let removed = conn.execute(&schema::delete_by_tag(&self.table), [tag])?;

        op_debug!(self, tag, removed, "Removed items with tag");
        Ok(removed)
    }

    /// Remove every record in the table. Returns how many were deleted.
    pub fn remove_all(&self) -> Result<usize> {
        let conn = self.connection()?;
        let removed = conn.execute(&schema::delete_all(&self.table), [])?;

        op_debug!(self, removed, "Removed all items");
        Ok(removed)
    }

    /// Release this store's table from the database handle
    pub fn close(self) -> Result<()> {
        self.db.release_table(&self.table)?;
        op_debug!(self, "Closed store");
        Ok(())
    }
}

fn upsert_rows(
    conn: &Connection,
    table: &str,
    rows: &[(String, String)],
    tag: Option<&str>,
) -> Result<()> {
    let mut stmt = conn.prepare(&schema::upsert(table))?;
    for (id, json) in rows {
        stmt.execute(params![id, json, tag])?;
    }
    Ok(())
}
