//! Startup-built lookup of partner adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::BidderAdapter;

/// Adapters keyed by partner id. Built once and shared read-only.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn BidderAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any earlier one with the same name.
    pub fn register(&mut self, adapter: Arc<dyn BidderAdapter>) {
        let name = adapter.partner_name().to_string();
        log::info!("Registering bidder adapter: {}", name);
        if self.adapters.insert(name.clone(), adapter).is_some() {
            log::warn!("Adapter '{}' registered twice, keeping the latest", name);
        }
    }

    #[must_use]
    pub fn get(&self, partner: &str) -> Option<&Arc<dyn BidderAdapter>> {
        self.adapters.get(partner)
    }

    /// Registered partner ids, sorted for stable output.
    #[must_use]
    pub fn partner_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("partners", &self.partner_names())
            .finish()
    }
}
