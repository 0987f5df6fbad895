//! Feeding normalized scope into the store

use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::scope::build_scope_host_db;
use crate::storage::Cache;

pub struct ScopeSync {
    cache: Arc<Cache>,
}

impl ScopeSync {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Expand a target's host scope and record every address.
    /// Returns how many addresses were new to the cache.
    pub fn sync_host_scope<S: AsRef<str>>(&self, target_slug: &str, cidrs: &[S]) -> Result<usize> {
        let records = build_scope_host_db(target_slug, cidrs)?;
        let created = self.cache.upsert_ips(&records)?;
        info!(
            "Host scope for {}: {} address(es), {} new",
            target_slug,
            records.len(),
            created
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::filter::Filters;

    #[test]
    fn test_sync_host_scope_is_idempotent() {
        let cache = Arc::new(Cache::in_memory().unwrap());
        let sync = ScopeSync::new(cache.clone());

        assert_eq!(sync.sync_host_scope("T1", &["10.0.0.0/30"]).unwrap(), 4);
        assert_eq!(sync.sync_host_scope("T1", &["10.0.0.0/31"]).unwrap(), 0);

        let ips = cache.find_ips(&Filters::new().eq("target", "T1")).unwrap();
        assert_eq!(ips.len(), 4);
    }

    #[test]
    fn test_malformed_scope_writes_nothing() {
        let cache = Arc::new(Cache::in_memory().unwrap());
        let sync = ScopeSync::new(cache.clone());

        let err = sync
            .sync_host_scope("T1", &["10.0.0.0/31", "10.0.0.999"])
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidAddress { .. }));
        assert!(cache.ips().unwrap().is_empty());
    }
}
