//! User system configuration and logging setup
//!
//! Configuration is plain serde data persisted as pretty JSON. Writes go
//! through a temp file and rename so a crash never leaves a torn file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::auto_create::AutoCreationPolicy;

/// Where users and properties are stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// Process-local, lost on exit
    #[default]
    Memory,
    /// SQLite database file
    Sqlite {
        /// Database file path
        path: PathBuf,
    },
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden per target by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration for the user system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSystemConfig {
    /// Storage backend
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Implicit user creation on inbound events
    #[serde(default)]
    pub auto_create: AutoCreationPolicy,

    /// Logging setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Install a global `tracing` subscriber.
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Write configuration atomically
pub fn write_config(path: &Path, config: &UserSystemConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(path, &json)
}

/// Load configuration
pub fn load_config(path: &Path) -> Result<UserSystemConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: UserSystemConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;
    Ok(config)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;
        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::auto_create::ExternalIdKind;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UserSystemConfig::default();
        assert_eq!(config.database, DatabaseConfig::Memory);
        assert_eq!(config.auto_create, AutoCreationPolicy::Disabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_write_and_load_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("users.json");

        let config = UserSystemConfig {
            database: DatabaseConfig::Sqlite {
                path: temp.path().join("users.db"),
            },
            auto_create: AutoCreationPolicy::Enabled(ExternalIdKind::telegram()),
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        };

        write_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_sections_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("users.json");
        std::fs::write(&path, "{}").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, UserSystemConfig::default());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(load_config(&temp.path().join("absent.json")).is_err());
    }
}
