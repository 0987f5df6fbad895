//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Cache directory and database file name
//! - Default log filter

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Environment variable that replaces `cache.config_dir`
pub const CACHE_DIR_ENV: &str = "BOUNTY_CACHE_DIR";

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the cache database lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database, `~` is expanded against HOME
    pub config_dir: String,
    pub database_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl CacheConfig {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&content).context("Failed to parse config file")
        } else {
            Self::parse(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                config.cache.config_dir = dir;
            }
        }
        Ok(config)
    }

    /// Cache directory with `~` expanded
    pub fn config_dir(&self) -> PathBuf {
        expand_home(&self.cache.config_dir)
    }

    /// Full path of the cache database file
    pub fn database_path(&self) -> PathBuf {
        self.config_dir().join(&self.cache.database_file)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            cache: StoreConfig {
                config_dir: "~/.config/synack".to_string(),
                database_file: "synackapi.db".to_string(),
            },
            logging: LoggingConfig::default(),
        })
    }
}

/// Expand a leading `~` using HOME. Paths without one are returned as-is.
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: CacheConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.cache.database_file, "synackapi.db");
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_logging_section_optional() {
        let config: CacheConfig = toml::from_str(
            r#"
            [cache]
            config_dir = "/var/lib/cache"
            database_file = "inventory.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.filter, "info");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/cache/inventory.db")
        );
    }

    #[test]
    fn test_expand_home() {
        let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
            return;
        };
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("~/.config/synack"), home.join(".config/synack"));
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
    }
}
