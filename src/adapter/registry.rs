//! Adapter registry: site-id → adapter, and URL → adapter by hostname.
//!
//! Explicit construction rather than a global singleton (teacher's
//! `SessionManagerImpl::new`/`mock()` constructor-injection pattern) —
//! this resolves spec §9's "global singleton registry" redesign flag:
//! tests inject whatever subset of adapters they need.

use super::{AdapterIdentity, SiteAdapter};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct AdapterRegistry {
    by_id: HashMap<String, Arc<SiteAdapter>>,
    /// Insertion order, preserved for first-match URL lookup.
    ordered: Vec<Arc<SiteAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Arc<SiteAdapter>>) -> Self {
        let mut by_id = HashMap::with_capacity(adapters.len());
        for adapter in &adapters {
            by_id.insert(adapter.website_id().to_string(), Arc::clone(adapter));
        }
        Self {
            by_id,
            ordered: adapters,
        }
    }

    /// O(1) lookup by site id.
    pub fn get_by_id(&self, id: &str) -> Option<Arc<SiteAdapter>> {
        self.by_id.get(id).cloned()
    }

    /// Linear scan in insertion order; first URL match wins.
    pub fn get_by_url(&self, url: &str) -> Option<Arc<SiteAdapter>> {
        self.ordered.iter().find(|a| a.url_matcher(url)).cloned()
    }

    /// Immutable list of supported sites.
    pub fn supported_websites(&self) -> Vec<AdapterIdentity> {
        self.ordered.iter().map(|a| a.identity.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{FixedDelayWaiter, ResponseWaiter};
    use crate::selectors::SelectorProfile;

    fn make_adapter(id: &str, host: &str) -> Arc<SiteAdapter> {
        Arc::new(SiteAdapter {
            identity: AdapterIdentity {
                website_id: id.to_string(),
                display_name: id.to_string(),
                home_url: format!("https://{}", host),
                requires_proxy: false,
            },
            selectors: SelectorProfile::default(),
            url_hosts: vec![host.to_string()],
            response_waiter: Arc::new(FixedDelayWaiter) as Arc<dyn ResponseWaiter>,
        })
    }

    #[test]
    fn test_get_by_id() {
        let registry = AdapterRegistry::new(vec![make_adapter("chatgpt", "chat.openai.com")]);
        assert!(registry.get_by_id("chatgpt").is_some());
        assert!(registry.get_by_id("unknown-id").is_none());
    }

    #[test]
    fn test_get_by_url_first_match_wins() {
        let registry = AdapterRegistry::new(vec![
            make_adapter("a", "example.com"),
            make_adapter("b", "example.com"),
        ]);
        let found = registry.get_by_url("https://www.example.com/chat").unwrap();
        assert_eq!(found.website_id(), "a");
    }

    #[test]
    fn test_supported_websites_preserves_order() {
        let registry = AdapterRegistry::new(vec![
            make_adapter("a", "a.com"),
            make_adapter("b", "b.com"),
        ]);
        let sites = registry.supported_websites();
        assert_eq!(sites[0].website_id, "a");
        assert_eq!(sites[1].website_id, "b");
    }
}
