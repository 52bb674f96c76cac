//! Configuration for the storage backends and startup bootstrap.
//!
//! Configuration is read from TOML. `EngineConfig::load("config/engine", true)`
//! reads `config/engine.toml`, or `config/engine.<ENV>.toml` when the `ENV`
//! environment variable is set. `PATHSTORE_DOCUMENT_PATH` and
//! `PATHSTORE_RELATIONAL_PATH` override the store locations.
//!
//! ```toml
//! [document]
//! path = "data/documents"
//!
//! [relational]
//! path = "data/pathstore.sqlite3"
//!
//! [bootstrap]
//! sync = ["user", "organ"]
//!
//! [bootstrap.inits]
//! user = "fixtures/users.json"
//! ```

pub mod error;

pub use error::{ConfigError, ConfigResult};

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_SELECTOR: &str = "ENV";
pub const DOCUMENT_PATH_ENV: &str = "PATHSTORE_DOCUMENT_PATH";
pub const RELATIONAL_PATH_ENV: &str = "PATHSTORE_RELATIONAL_PATH";

/// SQLite path that keeps the database in memory
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub document: DocumentStoreConfig,
    pub relational: RelationalStoreConfig,
    pub bootstrap: BootstrapConfig,
}

/// Settings for the embedded document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    /// Directory of the sled database
    pub path: PathBuf,
    /// Delete the database when the store is dropped
    pub temporary: bool,
    /// Background flush interval; `None` keeps sled's default
    pub flush_every_ms: Option<u64>,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/documents"),
            temporary: false,
            flush_every_ms: None,
        }
    }
}

impl DocumentStoreConfig {
    /// A throwaway database, used by tests and dry runs
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }
}

/// Settings for the SQLite store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalStoreConfig {
    /// Database file, or `:memory:`
    pub path: String,
}

impl Default for RelationalStoreConfig {
    fn default() -> Self {
        Self {
            path: "data/pathstore.sqlite3".to_string(),
        }
    }
}

impl RelationalStoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: IN_MEMORY.to_string(),
        }
    }
}

/// Which schemas to drop and recreate at startup.
///
/// In TOML: `sync = true`, `sync = false` or `sync = ["user", "organ"]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SyncSetting", into = "SyncSetting")]
pub enum SyncPolicy {
    All,
    Named(Vec<String>),
    #[default]
    Off,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SyncSetting {
    Flag(bool),
    Named(Vec<String>),
}

impl From<SyncSetting> for SyncPolicy {
    fn from(setting: SyncSetting) -> Self {
        match setting {
            SyncSetting::Flag(true) => SyncPolicy::All,
            SyncSetting::Flag(false) => SyncPolicy::Off,
            SyncSetting::Named(names) => SyncPolicy::Named(names),
        }
    }
}

impl From<SyncPolicy> for SyncSetting {
    fn from(policy: SyncPolicy) -> Self {
        match policy {
            SyncPolicy::All => SyncSetting::Flag(true),
            SyncPolicy::Off => SyncSetting::Flag(false),
            SyncPolicy::Named(names) => SyncSetting::Named(names),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub sync: SyncPolicy,
    /// Schema name → fixture file imported with `dump`
    pub inits: BTreeMap<String, PathBuf>,
}

impl EngineConfig {
    /// Loads `<base>.toml` (or `<base>.<ENV>.toml`), applies environment
    /// overrides and validates the result.
    pub fn load(base: impl AsRef<Path>, with_env: bool) -> ConfigResult<Self> {
        let env = std::env::var(ENV_SELECTOR).ok();
        let path = config_file_path(base.as_ref(), with_env, env.as_deref());
        if !path.exists() {
            return Err(ConfigError::not_found(path.display().to_string()));
        }

        let text = std::fs::read_to_string(&path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `PATHSTORE_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DOCUMENT_PATH_ENV) {
            self.document.path = PathBuf::from(path);
        }
        if let Some(path) = lookup(RELATIONAL_PATH_ENV) {
            self.relational.path = path;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.relational.path.trim().is_empty() {
            return Err(ConfigError::validation("relational.path must not be empty"));
        }
        if !self.document.temporary && self.document.path.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "document.path must not be empty unless document.temporary is set",
            ));
        }
        Ok(())
    }
}

/// `<base>.toml`, or `<base>.<env>.toml` when `with_env` and an env is given.
pub fn config_file_path(base: &Path, with_env: bool, env: Option<&str>) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    if let Some(env) = env.filter(|env| with_env && !env.is_empty()) {
        name.push(".");
        name.push(env);
    }
    name.push(".toml");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml_str(
            r#"
            [document]
            path = "/tmp/docs"
            temporary = true

            [relational]
            path = ":memory:"

            [bootstrap]
            sync = ["user", "organ"]

            [bootstrap.inits]
            user = "fixtures/users.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.document.path, PathBuf::from("/tmp/docs"));
        assert!(config.document.temporary);
        assert_eq!(config.relational.path, IN_MEMORY);
        assert_eq!(
            config.bootstrap.sync,
            SyncPolicy::Named(vec!["user".to_string(), "organ".to_string()])
        );
        assert_eq!(
            config.bootstrap.inits.get("user"),
            Some(&PathBuf::from("fixtures/users.json"))
        );
    }

    #[test]
    fn test_sync_flag_and_defaults() {
        let config = EngineConfig::from_toml_str("[bootstrap]\nsync = true\n").unwrap();
        assert_eq!(config.bootstrap.sync, SyncPolicy::All);
        assert_eq!(config.relational, RelationalStoreConfig::default());

        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.bootstrap.sync, SyncPolicy::Off);
    }

    #[test]
    fn test_config_file_path_with_env() {
        let base = Path::new("config/engine");
        assert_eq!(
            config_file_path(base, true, Some("test")),
            PathBuf::from("config/engine.test.toml")
        );
        assert_eq!(
            config_file_path(base, false, Some("test")),
            PathBuf::from("config/engine.toml")
        );
        assert_eq!(config_file_path(base, true, None), PathBuf::from("config/engine.toml"));
    }

    #[test]
    fn test_overrides_and_validation() {
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| match key {
            RELATIONAL_PATH_ENV => Some("/var/db.sqlite3".to_string()),
            _ => None,
        });
        assert_eq!(config.relational.path, "/var/db.sqlite3");
        assert!(config.validate().is_ok());

        config.relational.path = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_reads_file_and_reports_missing() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("engine");
        assert!(matches!(
            EngineConfig::load(&base, false),
            Err(ConfigError::NotFound(_))
        ));

        std::fs::write(dir.path().join("engine.toml"), "[relational]\npath = \"x.db\"\n").unwrap();
        let config = EngineConfig::load(&base, false).unwrap();
        assert!(!config.relational.path.is_empty());
    }
}
