//! Store configuration and engine selection.
//!
//! ```toml
//! name = "main"
//! storage = "redb"        # or "memory"
//! path = "data/origins.redb"
//! ```
//!
//! A relative `path` is resolved against the directory of the config file it
//! was read from. `ORIGINS_STORE_NAME`, `ORIGINS_STORAGE` and `ORIGINS_PATH`
//! override the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::{Engine, MemoryEngine, OriginsError, RedbEngine, Result, Store};

pub const ENV_NAME: &str = "ORIGINS_STORE_NAME";
pub const ENV_STORAGE: &str = "ORIGINS_STORAGE";
pub const ENV_PATH: &str = "ORIGINS_PATH";

/// Which [`Engine`] backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Persistent, file-backed redb database.
    #[serde(alias = "boltdb")]
    Redb,
    /// Volatile in-process map.
    #[default]
    Memory,
}

impl FromStr for StorageKind {
    type Err = OriginsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" | "boltdb" => Ok(StorageKind::Redb),
            "memory" => Ok(StorageKind::Memory),
            other => Err(OriginsError::Config(format!("unknown storage {other:?}"))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Redb => write!(f, "redb"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Store name; the header lives at `origins.<name>`.
    pub name: String,
    pub storage: StorageKind,
    /// Database file, required for [`StorageKind::Redb`].
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "origins".to_string(),
            storage: StorageKind::default(),
            path: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| OriginsError::Config(e.to_string()))
    }

    /// Read a TOML config file, resolving a relative `path` against the
    /// file's directory.
    pub fn load(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)
            .map_err(|e| OriginsError::Config(format!("{}: {e}", file.display())))?;
        let mut config = Self::from_toml_str(&text)?;

        if let Some(path) = config.path.take() {
            let base = file.parent().unwrap_or_else(|| Path::new(""));
            config.path = Some(if path.is_relative() {
                base.join(path)
            } else {
                path
            });
        }

        debug!("loaded config from {}", file.display());
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(name) = var(ENV_NAME) {
            self.name = name;
        }
        if let Some(storage) = var(ENV_STORAGE) {
            self.storage = storage.parse()?;
        }
        if let Some(path) = var(ENV_PATH) {
            self.path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Construct the configured engine.
    pub fn open_engine(&self) -> Result<Arc<dyn Engine>> {
        match self.storage {
            StorageKind::Redb => {
                let path = self.path.as_ref().ok_or_else(|| {
                    OriginsError::Config("redb storage requires a path".to_string())
                })?;
                debug!("opening redb engine at {}", path.display());
                Ok(Arc::new(RedbEngine::open(path)?))
            }
            StorageKind::Memory => Ok(Arc::new(MemoryEngine::new())),
        }
    }

    /// Construct the configured engine and initialize the store on it.
    pub fn open_store(&self) -> Result<Store> {
        Store::init(self.name.clone(), self.open_engine()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_to_memory_store() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        let store = config.open_store().unwrap();
        assert_eq!(store.name(), "origins");
    }

    #[test]
    fn parses_storage_names() {
        let config = Config::from_toml_str("storage = \"boltdb\"\npath = \"/tmp/x\"").unwrap();
        assert_eq!(config.storage, StorageKind::Redb);
        assert_eq!("Memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!(matches!(
            "sqlite".parse::<StorageKind>(),
            Err(OriginsError::Config(_))
        ));
        assert!(Config::from_toml_str("storage = \"sqlite\"").is_err());
        assert!(Config::from_toml_str("unknown = 1").is_err());
    }

    #[test]
    fn load_resolves_path_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("origins.toml");
        let toml = "name = \"main\"\nstorage = \"redb\"\npath = \"data.redb\"";
        std::fs::write(&file, toml).unwrap();

        let config = Config::load(&file).unwrap();
        assert_eq!(config.name, "main");
        assert_eq!(config.path, Some(dir.path().join("data.redb")));

        let store = config.open_store().unwrap();
        assert_eq!(store.name(), "main");
        assert!(dir.path().join("data.redb").exists());
    }

    #[test]
    fn vars_override_file_values() {
        let vars: HashMap<&str, &str> = [(ENV_NAME, "other"), (ENV_STORAGE, "memory")].into();
        let config = Config::from_toml_str("name = \"main\"\nstorage = \"redb\"")
            .unwrap()
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.name, "other");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.path, None);
    }

    #[test]
    fn redb_without_path_is_a_config_error() {
        let config = Config {
            storage: StorageKind::Redb,
            ..Config::default()
        };
        assert!(matches!(
            config.open_engine(),
            Err(OriginsError::Config(_))
        ));
    }
}
