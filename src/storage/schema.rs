//! Database schema definitions
//!
//! Every record table has the same shape; only its name varies. Table names
//! are validated identifiers (see [`crate::record::validate_table_name`]) and
//! are additionally double-quoted wherever they are spliced into SQL.

/// Primary key column
pub const ID: &str = "ID";
/// JSON payload column
pub const ITEM: &str = "ITEM";
/// Optional grouping label column
pub const TAG: &str = "TAG";

/// Schema version baked into this build. Bumping it wipes every table.
pub const SCHEMA_VERSION: u32 = 1;

/// Default database file name
pub const DEFAULT_DATABASE_NAME: &str = "crate.db";

/// SQL listing every user table in the database
pub const LIST_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

fn quoted(table: &str) -> String {
    format!("\"{}\"", table)
}

/// SQL to create a record table
pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY, {} TEXT, {} TEXT)",
        quoted(table),
        ID,
        ITEM,
        TAG
    )
}

/// SQL to drop a table
pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quoted(table))
}

/// Upsert keyed by id. A NULL tag keeps whatever tag the row already has.
pub fn upsert(table: &str) -> String {
    format!(
        "INSERT INTO {t} ({id}, {item}, {tag}) VALUES (?1, ?2, ?3) \
         ON CONFLICT({id}) DO UPDATE SET {item} = excluded.{item}, {tag} = COALESCE(excluded.{tag}, {tag})",
        t = quoted(table),
        id = ID,
        item = ITEM,
        tag = TAG
    )
}

pub fn select_item_by_id(table: &str) -> String {
    format!("SELECT {} FROM {} WHERE {} = ?1", ITEM, quoted(table), ID)
}

pub fn select_exists_by_id(table: &str) -> String {
    format!("SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1", quoted(table), ID)
}

pub fn select_items_by_tag(table: &str) -> String {
    format!("SELECT {}, {} FROM {} WHERE {} = ?1", ID, ITEM, quoted(table), TAG)
}

pub fn select_first_item_by_tag(table: &str) -> String {
    format!("SELECT {}, {} FROM {} WHERE {} = ?1 LIMIT 1", ID, ITEM, quoted(table), TAG)
}

pub fn select_all_items(table: &str) -> String {
    format!("SELECT {}, {} FROM {}", ID, ITEM, quoted(table))
}

pub fn count_all(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quoted(table))
}

pub fn count_by_tag(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", quoted(table), TAG)
}

pub fn delete_by_id(table: &str) -> String {
    format!("DELETE FROM {} WHERE {} = ?1", quoted(table), ID)
}

pub fn delete_by_tag(table: &str) -> String {
    format!("DELETE FROM {} WHERE {} = ?1", quoted(table), TAG)
}

pub fn delete_all(table: &str) -> String {
    format!("DELETE FROM {}", quoted(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_shape() {
        assert_eq!(
            create_table("contacts"),
            "CREATE TABLE IF NOT EXISTS \"contacts\" (ID TEXT PRIMARY KEY, ITEM TEXT, TAG TEXT)"
        );
    }

    #[test]
    fn test_upsert_keeps_tag_when_null() {
        let sql = upsert("contacts");
        assert!(sql.contains("ON CONFLICT(ID)"));
        assert!(sql.contains("COALESCE(excluded.TAG, TAG)"));
    }
}
