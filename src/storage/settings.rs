//! The singleton settings row
//!
//! The row is created with column defaults the first time it is read or
//! written, so callers never see it missing.

use rusqlite::types::Value;
use rusqlite::Transaction;
use std::fmt;

use super::Cache;
use crate::error::{CacheError, Result};
use crate::models::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Integer,
    Bool,
}

impl SettingKind {
    fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Bool => "boolean",
        }
    }
}

/// Every settings column and the kind of value it holds
pub const SETTINGS: &[(&str, SettingKind)] = &[
    ("api_token", SettingKind::Text),
    ("debug", SettingKind::Bool),
    ("email", SettingKind::Text),
    ("http_proxy", SettingKind::Text),
    ("https_proxy", SettingKind::Text),
    ("login", SettingKind::Bool),
    ("notifications_token", SettingKind::Text),
    ("otp_secret", SettingKind::Text),
    ("password", SettingKind::Text),
    ("scratchspace_dir", SettingKind::Text),
    ("slack_url", SettingKind::Text),
    ("smtp_email_from", SettingKind::Text),
    ("smtp_email_to", SettingKind::Text),
    ("smtp_password", SettingKind::Text),
    ("smtp_port", SettingKind::Integer),
    ("smtp_server", SettingKind::Text),
    ("smtp_starttls", SettingKind::Bool),
    ("smtp_username", SettingKind::Text),
    ("template_dir", SettingKind::Text),
    ("user_id", SettingKind::Text),
    ("use_proxies", SettingKind::Bool),
    ("use_scratchspace", SettingKind::Bool),
];

/// Value of a single setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn kind(&self) -> SettingKind {
        match self {
            Self::Text(_) => SettingKind::Text,
            Self::Integer(_) => SettingKind::Integer,
            Self::Bool(_) => SettingKind::Bool,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u16> for ConfigValue {
    fn from(v: u16) -> Self {
        Self::Integer(v.into())
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl Cache {
    /// Read one setting by column name
    pub fn get_config(&self, name: &str) -> Result<ConfigValue> {
        let (column, kind) = lookup(name)?;
        self.with_tx(|tx| {
            ensure_row(tx)?;
            let sql = format!("SELECT {column} FROM config WHERE id = 1");
            let value = match kind {
                SettingKind::Text => ConfigValue::Text(tx.query_row(&sql, [], |r| r.get(0))?),
                SettingKind::Integer => {
                    ConfigValue::Integer(tx.query_row(&sql, [], |r| r.get(0))?)
                }
                SettingKind::Bool => ConfigValue::Bool(tx.query_row(&sql, [], |r| r.get(0))?),
            };
            Ok(value)
        })
    }

    /// Write one setting by column name; the value must match its kind
    pub fn set_config(&self, name: &str, value: impl Into<ConfigValue>) -> Result<()> {
        let (column, kind) = lookup(name)?;
        let value = value.into();
        if value.kind() != kind {
            return Err(CacheError::SettingType {
                name: name.to_string(),
                expected: kind.name(),
            });
        }

        let sql_value = match value {
            ConfigValue::Text(s) => Value::Text(s),
            ConfigValue::Integer(n) => Value::Integer(n),
            ConfigValue::Bool(b) => Value::Integer(i64::from(b)),
        };

        self.with_tx(|tx| {
            ensure_row(tx)?;
            tx.execute(
                &format!("UPDATE config SET {column} = ?1 WHERE id = 1"),
                [sql_value],
            )?;
            Ok(())
        })
    }

    /// Snapshot of the whole settings row
    pub fn config(&self) -> Result<Config> {
        self.with_tx(|tx| {
            ensure_row(tx)?;
            let sql = format!("SELECT {} FROM config WHERE id = 1", Config::COLUMNS);
            Ok(tx.query_row(&sql, [], Config::from_row)?)
        })
    }

    /// `(http, https)` proxy URLs
    pub fn proxies(&self) -> Result<(String, String)> {
        let config = self.config()?;
        Ok((config.http_proxy, config.https_proxy))
    }
}

fn lookup(name: &str) -> Result<(&'static str, SettingKind)> {
    SETTINGS
        .iter()
        .find(|(column, _)| *column == name)
        .copied()
        .ok_or_else(|| CacheError::UnknownSetting(name.to_string()))
}

fn ensure_row(tx: &Transaction<'_>) -> Result<()> {
    tx.execute("INSERT OR IGNORE INTO config (id) VALUES (1)", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_on_first_read() {
        let cache = Cache::in_memory().unwrap();

        assert_eq!(cache.get_config("api_token").unwrap(), ConfigValue::Text(String::new()));
        assert_eq!(cache.get_config("smtp_port").unwrap().as_i64(), Some(465));
        assert_eq!(cache.get_config("login").unwrap().as_bool(), Some(true));
        assert_eq!(cache.get_config("use_scratchspace").unwrap().as_bool(), Some(false));
        assert_eq!(
            cache.get_config("template_dir").unwrap().as_str(),
            Some("~/Templates")
        );
    }

    #[test]
    fn test_set_then_get() {
        let cache = Cache::in_memory().unwrap();

        cache.set_config("password", "bacon").unwrap();
        cache.set_config("use_proxies", true).unwrap();
        cache.set_config("smtp_port", 587i64).unwrap();

        assert_eq!(cache.get_config("password").unwrap().to_string(), "bacon");
        assert_eq!(cache.get_config("use_proxies").unwrap(), ConfigValue::Bool(true));
        assert_eq!(cache.get_config("smtp_port").unwrap().as_i64(), Some(587));

        let config = cache.config().unwrap();
        assert_eq!(config.password, "bacon");
        assert!(config.use_proxies);
        assert_eq!(config.smtp_port, 587);
    }

    #[test]
    fn test_set_on_empty_store_creates_row() {
        let cache = Cache::in_memory().unwrap();
        cache.set_config("user_id", "qwe").unwrap();
        let config = cache.config().unwrap();
        assert_eq!(config.user_id, "qwe");
        assert_eq!(config.http_proxy, "http://localhost:8080");
    }

    #[test]
    fn test_proxies() {
        let cache = Cache::in_memory().unwrap();
        cache.set_config("https_proxy", "https://localhost:8080").unwrap();
        assert_eq!(
            cache.proxies().unwrap(),
            (
                "http://localhost:8080".to_string(),
                "https://localhost:8080".to_string()
            )
        );
    }

    #[test]
    fn test_unknown_and_mistyped_settings() {
        let cache = Cache::in_memory().unwrap();
        assert!(matches!(
            cache.get_config("id"),
            Err(CacheError::UnknownSetting(_))
        ));
        assert!(matches!(
            cache.set_config("debug", "yes"),
            Err(CacheError::SettingType { expected: "boolean", .. })
        ));
    }
}
