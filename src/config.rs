use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::permissions::PermissionPolicy;

/// Registry configuration, read from a TOML file.
///
/// ```toml
/// database_path = "contract-registry.db"
///
/// [server]
/// bind_address = "127.0.0.1:3000"
///
/// [policy.roles]
/// clerk = ["view", "create", "edit"]
///
/// [policy.assignments]
/// "22251193847" = ["clerk"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding every registry
    pub database_path: PathBuf,

    pub server: ServerConfig,

    /// Per-person permission grants
    pub policy: PermissionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("contract-registry.db"),
            server: ServerConfig::default(),
            policy: PermissionPolicy::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        for entry in config.policy.invalid_entries() {
            warn!(entry = %entry, "policy role grants an unknown permission");
        }
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::permissions::Permission;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_path, PathBuf::from("contract-registry.db"));
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert!(config.policy.roles.is_empty());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[policy.roles]
clerk = ["view", "create", "edit"]

[policy.assignments]
"22251193847" = ["clerk"]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.policy.roles_for("222.511.938-47"), vec!["clerk"]);
        assert_eq!(config.policy.roles["clerk"].len(), 3);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = [").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");

        let mut config = Config::default();
        config.database_path = PathBuf::from("/var/lib/registry.db");
        config.policy = PermissionPolicy::new()
            .with_role("auditor", &[Permission::View])
            .with_assignment("111.444.777-35", "auditor");
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
