use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::types::{AssetComponent, AssetId, ComponentId};

/// Secondary index `component_id -> set of asset_id`.
///
/// The component cache is keyed by asset, but the matching workflow starts
/// from a component. This index answers "which cached lists contain this
/// component" without scanning every cached entry.
///
/// The index is advisory: it may reference assets whose entries have since
/// been evicted. Consumers skip keys that no longer resolve and prune them via
/// [`remove_asset`](Self::remove_asset).
#[derive(Debug, Default)]
pub struct ComponentIndex {
    inner: Mutex<IndexInner>,
}

#[derive(Debug, Default)]
struct IndexInner {
    by_component: HashMap<ComponentId, HashSet<AssetId>>,
    by_asset: HashMap<AssetId, Vec<ComponentId>>,
}

impl ComponentIndex {
    /// Records the component ids of a freshly stored list for `asset_id`,
    /// replacing whatever was recorded for that asset before.
    pub fn record(&self, asset_id: AssetId, components: &[AssetComponent]) {
        let mut inner = self.inner.lock().unwrap();
        inner.unlink_asset(asset_id);

        let ids: Vec<_> = components.iter().map(|c| c.component_id).collect();
        for component_id in &ids {
            inner
                .by_component
                .entry(*component_id)
                .or_default()
                .insert(asset_id);
        }
        inner.by_asset.insert(asset_id, ids);
    }

    /// Drops all mappings for an asset whose cache entry is gone.
    pub fn remove_asset(&self, asset_id: AssetId) {
        let mut inner = self.inner.lock().unwrap();
        inner.unlink_asset(asset_id);
        inner.by_asset.remove(&asset_id);
    }

    /// The assets whose cached lists (may) contain `component_id`.
    pub fn assets_for(&self, component_id: ComponentId) -> Vec<AssetId> {
        let inner = self.inner.lock().unwrap();
        let mut assets: Vec<_> = inner
            .by_component
            .get(&component_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        // iteration order of the set is arbitrary
        assets.sort_unstable();
        assets
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_component.clear();
        inner.by_asset.clear();
    }

    /// Number of distinct components currently indexed.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_component.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndexInner {
    /// Removes `asset_id` from all `by_component` sets it was recorded in.
    fn unlink_asset(&mut self, asset_id: AssetId) {
        if let Some(previous) = self.by_asset.get(&asset_id) {
            for component_id in previous {
                if let Some(assets) = self.by_component.get_mut(component_id) {
                    assets.remove(&asset_id);
                    if assets.is_empty() {
                        self.by_component.remove(component_id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::types::ComponentType;

    use super::*;

    fn component(component_id: ComponentId, asset_id: AssetId) -> AssetComponent {
        AssetComponent {
            component_id,
            asset_id,
            component_type: ComponentType::Software,
            vendor: None,
            product: "demo".into(),
            version: None,
            cpe_full_string: None,
            matching_in_progress: false,
            matching_method: None,
            confidence_score: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let index = ComponentIndex::default();
        index.record(5, &[component(101, 5), component(102, 5)]);
        index.record(9, &[component(101, 9)]);

        assert_eq!(index.assets_for(101), vec![5, 9]);
        assert_eq!(index.assets_for(102), vec![5]);
        assert!(index.assets_for(999).is_empty());
    }

    #[test]
    fn test_rerecord_replaces_previous_mappings() {
        let index = ComponentIndex::default();
        index.record(5, &[component(101, 5), component(102, 5)]);
        // the next scan of asset 5 no longer contains component 102
        index.record(5, &[component(101, 5)]);

        assert_eq!(index.assets_for(101), vec![5]);
        assert!(index.assets_for(102).is_empty());
    }

    #[test]
    fn test_remove_asset() {
        let index = ComponentIndex::default();
        index.record(5, &[component(101, 5)]);
        index.record(9, &[component(101, 9)]);
        index.remove_asset(5);

        assert_eq!(index.assets_for(101), vec![9]);
    }
}
