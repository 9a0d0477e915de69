//! Record contract - what a type needs to live in a store
//!
//! Every stored type exposes a stable string id (the primary key) and names
//! the table it lives in. The table name is fixed at compile time so that a
//! rename of the Rust type never orphans existing rows.

use crate::{Error, Result};

/// A value that can be persisted by a [`Store`](crate::Store).
///
/// ```
/// use crate_store::Record;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Contact {
///     id: String,
///     name: String,
/// }
///
/// impl Record for Contact {
///     const TABLE: &'static str = "contacts";
///
///     fn id(&self) -> &str {
///         &self.id
///     }
/// }
/// ```
pub trait Record {
    /// Name of the backing table. Must be a plain SQL identifier.
    const TABLE: &'static str;

    /// Id used to store and retrieve this record.
    fn id(&self) -> &str;
}

/// Check that a table name is a plain SQL identifier: an ASCII letter or
/// underscore followed by letters, digits or underscores.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_head || !valid_tail || name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(Error::InvalidTableName(name.to_string()));
    }
    Ok(())
}

/// Derive a table name from a dotted or path-like type name, e.g.
/// `app::model::Contact` becomes `appmodelContact`.
pub fn table_name_from_path(path: &str) -> Result<String> {
    let name: String = path
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    validate_table_name(&name)?;
    Ok(name)
}
