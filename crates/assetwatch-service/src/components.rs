//! The asset-component cache, the busiest cache in assetwatch.
//!
//! Keyed by asset id, each entry holds the complete component listing of one
//! asset. On top of the generic [`Cacher`] this adds the secondary
//! [`ComponentIndex`] so the matching workflow can go from a component id to
//! every cached list containing it.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::caching::{
    CacheEntry, CacheInfo, CacheName, CacheRequest, Cacher, ComponentIndex, InMemoryItem,
};
use crate::config::CacheSettings;
use crate::types::{AssetComponent, AssetId, ComponentId, ComponentsList};
use crate::upstream::InventoryApi;

#[derive(Clone)]
pub struct ComponentsRequest {
    api: Arc<dyn InventoryApi>,
    index: Arc<ComponentIndex>,
}

impl CacheRequest for ComponentsRequest {
    type Key = AssetId;
    type Item = ComponentsList;

    const NAME: CacheName = CacheName::Components;

    fn fetch(&self, key: &Self::Key) -> BoxFuture<'static, CacheEntry<Self::Item>> {
        let api = Arc::clone(&self.api);
        let asset_id = *key;
        Box::pin(async move { api.asset_components(asset_id).await.map(Arc::new) })
    }

    fn weight(item: &Self::Item) -> u32 {
        (item.len() * std::mem::size_of::<AssetComponent>()) as u32
    }

    fn on_store(&self, key: &Self::Key, item: &Self::Item) {
        self.index.record(*key, item);
    }
}

/// Cache of per-asset component listings plus the component index.
#[derive(Debug, Clone)]
pub struct ComponentsCache {
    cacher: Cacher<ComponentsRequest>,
    index: Arc<ComponentIndex>,
}

impl ComponentsCache {
    pub fn new(settings: CacheSettings, api: Arc<dyn InventoryApi>) -> Self {
        let index = Arc::new(ComponentIndex::default());
        let cacher = Cacher::new(
            settings,
            ComponentsRequest {
                api,
                index: Arc::clone(&index),
            },
        );
        Self { cacher, index }
    }

    /// The component listing for `asset_id`.
    ///
    /// `None` means "no asset selected" in the dashboard; it resolves to an
    /// empty list without any cache or network traffic.
    pub async fn get(&self, asset_id: Option<AssetId>) -> CacheEntry<ComponentsList> {
        match asset_id {
            Some(asset_id) => self.cacher.get(&asset_id).await,
            None => Ok(Arc::new(Vec::new())),
        }
    }

    /// Best-effort cache warming for one asset.
    pub async fn prefetch(&self, asset_id: AssetId) {
        self.cacher.prefetch(&asset_id).await;
    }

    /// Drops all cached listings and the component index.
    pub fn clear(&self) {
        self.cacher.clear();
        self.index.clear();
    }

    pub async fn info(&self) -> CacheInfo {
        self.cacher.info().await
    }

    /// The cached assets that (may) contain `component_id`, per the index.
    pub fn assets_containing(&self, component_id: ComponentId) -> Vec<AssetId> {
        self.index.assets_for(component_id)
    }

    /// Raw entry access for the mutation orchestration.
    ///
    /// When the entry turns out to be evicted, the index mapping is pruned on
    /// the spot.
    pub(crate) async fn peek(&self, asset_id: AssetId) -> Option<InMemoryItem<ComponentsList>> {
        let item = self.cacher.peek(&asset_id).await;
        if item.is_none() {
            self.index.remove_asset(asset_id);
        }
        item
    }

    pub(crate) async fn restore(&self, asset_id: AssetId, item: InMemoryItem<ComponentsList>) {
        self.cacher.restore(asset_id, item).await;
    }

    pub(crate) async fn update(
        &self,
        asset_id: AssetId,
        f: impl FnOnce(&mut Vec<AssetComponent>),
    ) -> bool {
        self.cacher
            .update(&asset_id, |list| f(Arc::make_mut(list)))
            .await
    }
}
