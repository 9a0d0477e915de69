use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::schema::{DEFAULT_DATABASE_NAME, SCHEMA_VERSION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; parent directories are created on open
    pub database: PathBuf,
    pub schema_version: u32,
    /// Emit a debug record for every store operation. Errors are always logged.
    pub log_operations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE_NAME),
            schema_version: SCHEMA_VERSION,
            log_operations: true,
        }
    }
}

impl StoreConfig {
    /// Default settings with the database placed under `base`
    pub fn in_dir(base: &Path) -> Self {
        Self {
            database: default_database_path_in(base),
            ..Self::default()
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("crate-store.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".crate-store").join(DEFAULT_DATABASE_NAME)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    if config.schema_version == 0 {
        anyhow::bail!("schema_version in {} must be at least 1", path.display());
    }
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (pass force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, Record, Store};
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate-store.toml");
        std::fs::write(&path, "log_operations = false\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert!(!config.log_operations);
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE_NAME));
    }

    #[test]
    fn test_zero_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate-store.toml");
        std::fs::write(&path, "schema_version = 0\n").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crate-store.toml");
        let config = StoreConfig {
            schema_version: 4,
            ..StoreConfig::in_dir(dir.path())
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_database_from_config() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Note {
            id: String,
        }

        impl Record for Note {
            const TABLE: &'static str = "notes";

            fn id(&self) -> &str {
                &self.id
            }
        }

        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            log_operations: false,
            ..StoreConfig::in_dir(dir.path())
        };

        let db = Database::from_config(&config).unwrap();
        assert_eq!(db.path(), Some(config.database.as_path()));
        assert!(!db.log_operations());

        let notes = Store::<Note>::new(&db).unwrap();
        notes.put(&Note { id: "n1".to_string() }, None).unwrap();
        assert!(config.database.exists());
        assert!(notes.exists("n1").unwrap());
    }
}
