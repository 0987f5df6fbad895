//! Bounty Cache - local inventory for a bounty-engagement platform client
//!
//! Mirrors the platform's engagements, organizations, qualification
//! categories and discovered hosts/ports/urls into a SQLite file, and
//! normalizes the platform's scope definitions.
//!
//! # Pieces
//!
//! 1. [`Cache`] owns the schema and the idempotent upsert/find/remove operations
//! 2. [`scope`] turns host CIDR lists and web asset rules into cache records
//!    and a Burp Suite scope tree, without touching the store
//! 3. [`Inventory`] is the read side used by target and mission management
//!
//! [`assemble`] wires them together from a [`CacheConfig`]; each component
//! receives the store handle it needs, nothing is looked up by name.

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod migrations;
pub mod models;
pub mod query;
pub mod records;
pub mod scope;
pub mod storage;
pub mod sync;

use std::sync::Arc;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use filter::{Entity, FilterValue, Filters};
pub use logging::init_tracing;
pub use models::{Category, Config, HostPorts, HostUrls, Ip, Organization, Port, Target, Url};
pub use query::Inventory;
pub use records::{AssessmentRecord, IpRecord, PortBatch, PortRecord, UrlBatch, UrlRecord};
pub use scope::{
    build_scope_host_db, build_scope_web_burp, build_scope_web_db, BurpScope, WebAsset,
    WebScopeListing,
};
pub use storage::{Cache, ConfigValue};
pub use sync::ScopeSync;

/// The core components sharing one store
pub struct Core {
    pub cache: Arc<Cache>,
    pub inventory: Inventory,
    pub scope_sync: ScopeSync,
}

/// Open the configured store (running migrations) and build the components on top of it
pub fn assemble(config: &CacheConfig) -> Result<Core> {
    let cache = Arc::new(Cache::open_config(config)?);
    Ok(Core {
        inventory: Inventory::new(cache.clone()),
        scope_sync: ScopeSync::new(cache.clone()),
        cache,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_shares_one_store() {
        let dir = std::env::temp_dir().join(format!("bounty-cache-{}", uuid::Uuid::new_v4()));
        let config: CacheConfig = toml::from_str(&format!(
            "[cache]\nconfig_dir = \"{}\"\ndatabase_file = \"synackapi.db\"\n",
            dir.display()
        ))
        .unwrap();

        let core = assemble(&config).unwrap();
        core.scope_sync.sync_host_scope("T1", &["10.0.0.0/31"]).unwrap();

        let ips = core.inventory.ips(&Filters::new().eq("target", "T1")).unwrap();
        assert_eq!(ips.len(), 2);
        assert_eq!(core.cache.ips().unwrap().len(), 2);

        drop(core);
        std::fs::remove_dir_all(&dir).ok();
    }
}
