//! Read-side lookups for target and mission management
//!
//! Thin layer over the store's `find_*` operations. Filter keys may name any
//! column of the entity, of the host it hangs off, or of its owning target.

use std::sync::Arc;

use crate::error::Result;
use crate::filter::Filters;
use crate::models::{HostPorts, HostUrls, Ip, Target};
use crate::storage::Cache;

#[derive(Clone)]
pub struct Inventory {
    cache: Arc<Cache>,
}

impl Inventory {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    pub fn targets(&self, filters: &Filters) -> Result<Vec<Target>> {
        self.cache.find_targets(filters)
    }

    pub fn ips(&self, filters: &Filters) -> Result<Vec<Ip>> {
        self.cache.find_ips(filters)
    }

    pub fn ports(&self, filters: &Filters) -> Result<Vec<HostPorts>> {
        self.cache.find_ports(filters)
    }

    pub fn urls(&self, filters: &Filters) -> Result<Vec<HostUrls>> {
        self.cache.find_urls(filters)
    }

    /// Codename of the target with this slug, if it is cached
    pub fn codename_for_slug(&self, slug: &str) -> Result<Option<String>> {
        let found = self.targets(&Filters::new().eq("slug", slug))?;
        Ok(found.into_iter().next().and_then(|t| t.codename))
    }

    /// Slug of the first cached target with this codename
    pub fn slug_for_codename(&self, codename: &str) -> Result<Option<String>> {
        let found = self.targets(&Filters::new().eq("codename", codename))?;
        Ok(found.into_iter().next().map(|t| t.slug))
    }
}
