//! Embedded schema migrations
//!
//! Steps are forward-only and applied in version order. Each step runs in its
//! own transaction together with its `schema_migrations` bookkeeping row, so a
//! failed step leaves no trace and aborts store initialization.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{CacheError, Result};

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "config",
        sql: include_str!("../migrations/001_config.sql"),
    },
    Migration {
        version: 2,
        name: "categories",
        sql: include_str!("../migrations/002_categories.sql"),
    },
    Migration {
        version: 3,
        name: "organizations",
        sql: include_str!("../migrations/003_organizations.sql"),
    },
    Migration {
        version: 4,
        name: "targets",
        sql: include_str!("../migrations/004_targets.sql"),
    },
    Migration {
        version: 5,
        name: "ips",
        sql: include_str!("../migrations/005_ips.sql"),
    },
    Migration {
        version: 6,
        name: "ports",
        sql: include_str!("../migrations/006_ports.sql"),
    },
    Migration {
        version: 7,
        name: "urls",
        sql: include_str!("../migrations/007_urls.sql"),
    },
    Migration {
        version: 8,
        name: "notification_settings",
        sql: include_str!("../migrations/008_notification_settings.sql"),
    },
    Migration {
        version: 9,
        name: "use_scratchspace",
        sql: include_str!("../migrations/009_use_scratchspace.sql"),
    },
];

pub struct Migrator {
    steps: &'static [Migration],
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self { steps: MIGRATIONS }
    }

    /// Highest version this build knows about
    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|m| m.version).unwrap_or(0)
    }

    /// Apply every step newer than the recorded schema version.
    /// Returns the number of steps applied.
    pub fn run(&self, conn: &mut Connection) -> Result<usize> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current = current_version(conn)?;
        let mut applied = 0;

        for step in self.steps.iter().filter(|m| m.version > current) {
            let fail = |source| CacheError::Migration {
                version: step.version,
                name: step.name,
                source,
            };

            let tx = conn.transaction().map_err(fail)?;
            tx.execute_batch(step.sql).map_err(fail)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![step.version, step.name, Utc::now().to_rfc3339()],
            )
            .map_err(fail)?;
            tx.commit().map_err(fail)?;

            info!("Applied migration {:03}_{}", step.version, step.name);
            applied += 1;
        }

        if applied == 0 {
            debug!("Schema already at version {}", current);
        }

        Ok(applied)
    }
}

/// Schema version recorded in the database, 0 for a fresh file
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false)
    }

    #[test]
    fn test_versions_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_fresh_database_migrates_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new();

        let applied = migrator.run(&mut conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), migrator.latest_version());

        for table in ["config", "categories", "organizations", "targets", "ips", "ports", "urls"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new();
        migrator.run(&mut conn).unwrap();
        assert_eq!(migrator.run(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_failed_step_is_fatal_and_rolled_back() {
        static BROKEN: &[Migration] = &[
            Migration {
                version: 1,
                name: "good",
                sql: "CREATE TABLE a (id INTEGER PRIMARY KEY);",
            },
            Migration {
                version: 2,
                name: "bad",
                sql: "CREATE TABLE b (id INTEGER PRIMARY KEY); ALTER TABLE missing ADD COLUMN x;",
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator { steps: BROKEN };

        let err = migrator.run(&mut conn).unwrap_err();
        assert!(matches!(err, CacheError::Migration { version: 2, .. }));
        assert_eq!(current_version(&conn).unwrap(), 1);
        assert!(!table_exists(&conn, "b"));
    }
}
