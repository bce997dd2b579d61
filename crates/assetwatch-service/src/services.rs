//! Construction of all shared service state.
//!
//! One [`SharedServices`] is created at startup and handed to the web layer;
//! everything in it is cheaply cloneable. Tests construct it with
//! [`with_api`](SharedServices::with_api) to substitute the upstream.

use std::sync::Arc;

use crate::aggregates::{DevicesCache, StatsCache};
use crate::caching::CacheInfo;
use crate::components::ComponentsCache;
use crate::config::Config;
use crate::matching::CpeMatcher;
use crate::upstream::{HttpInventoryApi, InventoryApi};

#[derive(Clone)]
pub struct SharedServices {
    pub config: Config,
    pub components: ComponentsCache,
    pub devices: DevicesCache,
    pub stats: StatsCache,
    pub matcher: CpeMatcher,
}

impl SharedServices {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let api = Arc::new(HttpInventoryApi::new(&config)?);
        Ok(Self::with_api(config, api))
    }

    /// Builds the services over an arbitrary [`InventoryApi`] implementation.
    pub fn with_api(config: Config, api: Arc<dyn InventoryApi>) -> Self {
        let components = ComponentsCache::new(config.caches.components, api.clone());
        let devices = DevicesCache::new(config.caches.devices, api.clone());
        let stats = StatsCache::new(config.caches.stats, api.clone());
        let matcher = CpeMatcher::new(api, components.clone(), devices.clone(), stats.clone());

        Self {
            config,
            components,
            devices,
            stats,
            matcher,
        }
    }

    /// Diagnostic counters of all caches.
    pub async fn cache_info(&self) -> Vec<CacheInfo> {
        vec![
            self.components.info().await,
            self.devices.info().await,
            self.stats.info().await,
        ]
    }

    /// Drops all component listings and the component index.
    ///
    /// The device list and stats caches stay; they revalidate on their own
    /// schedule.
    pub fn clear_components_cache(&self) {
        self.components.clear();
        tracing::info!("components cache cleared");
    }
}
