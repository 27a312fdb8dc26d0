//! core::config
//!
//! Configuration loading, merging, and atomic persistence.
//!
//! # Search order
//!
//! Global config:
//! 1. `$TASKTREE_CONFIG` (explicit file path)
//! 2. `$XDG_CONFIG_HOME/tasktree/config.toml`
//! 3. `~/.tasktree/config.toml`
//!
//! Store config:
//! - `<store_root>/.tasktree/config.toml`
//!
//! Every accessor resolves store value, then global value, then a
//! built-in default, in that order.

pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use schema::{GlobalConfig, SchemaError, StoreConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    ReadError { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config at {path}: {source}")]
    ParseError { path: PathBuf, source: toml::de::Error },

    #[error("failed to write config at {path}: {source}")]
    WriteError { path: PathBuf, source: std::io::Error },

    #[error("invalid config value: {0}")]
    InvalidValue(#[from] SchemaError),

    #[error("could not determine home directory")]
    NoHomeDir,
}

const DEFAULT_RETENTION_DAYS: u32 = 30;
const DEFAULT_HISTORY_CAPACITY: usize = crate::core::ops::journal::DEFAULT_CAPACITY;

/// Loaded configuration for one store, combining global and store scopes.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub store: Option<StoreConfig>,
    pub global_path: PathBuf,
    pub store_path: Option<PathBuf>,
}

impl Config {
    /// Load global config, and store config if `store_root` is given.
    pub fn load(store_root: Option<&Path>) -> Result<Self, ConfigError> {
        let global_path = global_config_path()?;
        let global = load_toml::<GlobalConfig>(&global_path)?.unwrap_or_default();
        global.validate()?;

        let (store, store_path) = match store_root {
            Some(root) => {
                let path = store_config_path(root);
                let loaded = load_toml::<StoreConfig>(&path)?;
                if let Some(ref s) = loaded {
                    s.validate()?;
                }
                (loaded, Some(path))
            }
            None => (None, None),
        };

        Ok(Self {
            global,
            store,
            global_path,
            store_path,
        })
    }

    pub fn write_global(&self) -> Result<(), ConfigError> {
        write_toml_atomic(&self.global_path, &self.global)
    }

    pub fn write_store(&self) -> Result<(), ConfigError> {
        if let (Some(store), Some(path)) = (&self.store, &self.store_path) {
            write_toml_atomic(path, store)
        } else {
            Ok(())
        }
    }

    pub fn auto_strict_writes(&self) -> bool {
        self.store
            .as_ref()
            .and_then(|c| c.auto_strict_writes)
            .or(self.global.auto_strict_writes)
            .unwrap_or(true)
    }

    pub fn retention_days(&self) -> u32 {
        self.store
            .as_ref()
            .and_then(|c| c.retention_days)
            .or(self.global.retention_days)
            .unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    pub fn default_domain(&self) -> String {
        self.store
            .as_ref()
            .and_then(|c| c.default_domain.clone())
            .or_else(|| self.global.default_domain.clone())
            .unwrap_or_default()
    }

    pub fn sync_provider(&self) -> String {
        self.store
            .as_ref()
            .and_then(|c| c.sync_provider.clone())
            .or_else(|| self.global.sync_provider.clone())
            .unwrap_or_else(|| "none".to_string())
    }

    pub fn history_capacity(&self) -> usize {
        self.store
            .as_ref()
            .and_then(|c| c.history_capacity)
            .unwrap_or(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }
}

pub fn global_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("TASKTREE_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Some(xdg) = dirs::config_dir() {
        return Ok(xdg.join("tasktree").join("config.toml"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".tasktree").join("config.toml"))
}

pub fn store_config_path(store_root: &Path) -> PathBuf {
    store_root.join(".tasktree").join("config.toml")
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let value = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

fn write_toml_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(value).expect("config types always serialize");
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, text).map_err(|source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_with_no_files_uses_defaults() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("TASKTREE_CONFIG", temp.path().join("missing.toml"));
        let config = Config::load(None).unwrap();
        assert_eq!(config.retention_days(), DEFAULT_RETENTION_DAYS);
        assert!(config.auto_strict_writes());
        std::env::remove_var("TASKTREE_CONFIG");
    }

    #[test]
    fn store_config_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_path = temp.path().join("global.toml");
        fs::write(&global_path, "retention_days = 10\n").unwrap();
        std::env::set_var("TASKTREE_CONFIG", &global_path);

        let store_root = temp.path().join("store");
        fs::create_dir_all(store_root.join(".tasktree")).unwrap();
        fs::write(store_root.join(".tasktree/config.toml"), "retention_days = 5\n").unwrap();

        let config = Config::load(Some(&store_root)).unwrap();
        assert_eq!(config.retention_days(), 5);
        std::env::remove_var("TASKTREE_CONFIG");
    }

    #[test]
    fn write_global_then_load_roundtrips() {
        let temp = TempDir::new().unwrap();
        let global_path = temp.path().join("nested").join("global.toml");
        std::env::set_var("TASKTREE_CONFIG", &global_path);

        let mut config = Config::load(None).unwrap();
        config.global.retention_days = Some(14);
        config.write_global().unwrap();

        let reloaded = Config::load(None).unwrap();
        assert_eq!(reloaded.retention_days(), 14);
        std::env::remove_var("TASKTREE_CONFIG");
    }

    #[test]
    fn invalid_global_config_is_rejected_on_load() {
        let temp = TempDir::new().unwrap();
        let global_path = temp.path().join("global.toml");
        fs::write(&global_path, "retention_days = 0\n").unwrap();
        std::env::set_var("TASKTREE_CONFIG", &global_path);

        assert!(Config::load(None).is_err());
        std::env::remove_var("TASKTREE_CONFIG");
    }
}
