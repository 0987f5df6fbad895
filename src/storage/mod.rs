//! Local storage for the platform inventory
//!
//! One SQLite file holds targets, organizations, categories, discovered
//! hosts/ports/urls and the settings row. Every public operation runs in its
//! own transaction and commits before returning.
//!
//! Upserts are find-or-create on the natural key without a unique constraint
//! behind them. Writers in separate processes sharing one file can race and
//! insert the same logical row twice.

mod hosts;
mod settings;
mod targets;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::info;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::migrations::{self, Migrator};

pub use settings::{ConfigValue, SettingKind, SETTINGS};

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cache = Self::init(Connection::open(path)?)?;
        info!("Opened cache at {}", path.display());
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open the store at the configured location, creating the directory
    pub fn open_config(config: &CacheConfig) -> Result<Self> {
        std::fs::create_dir_all(config.config_dir())?;
        Self::new(config.database_path())
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Migrator::new().run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version currently recorded in the store
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock();
        migrations::current_version(&conn)
    }

    /// Run `f` inside a transaction, committing only if it succeeds
    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
