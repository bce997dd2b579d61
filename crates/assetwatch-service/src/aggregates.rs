//! Single-entry caches for the device list and the dashboard statistics.
//!
//! Both are keyed by `()`: there is exactly one device list and one stats
//! panel. They still get the full freshness machinery, with shorter windows
//! than the component cache since both views summarize matching state.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::caching::{CacheEntry, CacheInfo, CacheName, CacheRequest, Cacher};
use crate::config::CacheSettings;
use crate::types::{Device, StatCard};
use crate::upstream::InventoryApi;

macro_rules! aggregate_cache {
    ($request:ident, $cache:ident, $item:ty, $name:expr, $method:ident) => {
        #[derive(Clone)]
        pub struct $request {
            api: Arc<dyn InventoryApi>,
        }

        impl CacheRequest for $request {
            type Key = ();
            type Item = Arc<Vec<$item>>;

            const NAME: CacheName = $name;

            fn fetch(&self, _key: &Self::Key) -> BoxFuture<'static, CacheEntry<Self::Item>> {
                let api = Arc::clone(&self.api);
                Box::pin(async move { api.$method().await.map(Arc::new) })
            }

            fn weight(item: &Self::Item) -> u32 {
                (item.len() * std::mem::size_of::<$item>()) as u32
            }
        }

        #[derive(Debug, Clone)]
        pub struct $cache {
            cacher: Cacher<$request>,
        }

        impl $cache {
            pub fn new(settings: CacheSettings, api: Arc<dyn InventoryApi>) -> Self {
                Self {
                    cacher: Cacher::new(settings, $request { api }),
                }
            }

            pub async fn get(&self) -> CacheEntry<Arc<Vec<$item>>> {
                self.cacher.get(&()).await
            }

            /// Marks the single entry stale; the next read revalidates in the
            /// background.
            pub async fn invalidate(&self) {
                self.cacher.mark_stale(&()).await;
            }

            pub fn clear(&self) {
                self.cacher.clear();
            }

            pub async fn info(&self) -> CacheInfo {
                self.cacher.info().await
            }
        }
    };
}

aggregate_cache!(
    DevicesRequest,
    DevicesCache,
    Device,
    CacheName::Devices,
    devices
);
aggregate_cache!(
    StatsRequest,
    StatsCache,
    StatCard,
    CacheName::Stats,
    dashboard_stats
);
