use crate::messages::MigrationOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the store lives and how connecting to it may migrate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// Path to the SQLite database file; in-memory when unset
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub migration: MigrationOptions,
}

impl ConnectionConfig {
    /// A file-backed store at the given path
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Some(path.into()),
            ..Default::default()
        }
    }

    /// An in-memory store, gone when the connection closes
    pub fn in_memory() -> Self {
        Self::default()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("mltrace.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".mltrace").join("metadata.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<ConnectionConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ConnectionConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ConnectionConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mltrace.toml");

        let mut config = ConnectionConfig::with_database(dir.path().join("metadata.db"));
        config.migration.enable_upgrade_migration = true;

        write_config(&path, &config, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);

        // a second write without force is refused
        assert!(write_config(&path, &config, false).is_err());
        assert!(write_config(&path, &config, true).is_ok());
    }

    #[test]
    fn test_load_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("deep").join("metadata.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
