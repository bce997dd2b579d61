//! Batched, bounded cache warming.
//!
//! The dashboard fires a prefetch for every asset visible in the device list.
//! To keep that from stampeding the upstream, batches are capped in size and
//! fetched in small concurrent chunks.

use futures::future;

use crate::components::ComponentsCache;
use crate::types::AssetId;

/// How many assets of one batch are fetched concurrently.
pub const PREFETCH_CONCURRENCY: usize = 3;

/// Hard cap on the number of assets warmed per batch; the rest is dropped.
pub const MAX_PREFETCH_ASSETS: usize = 15;

impl ComponentsCache {
    /// Warms the cache for a batch of assets.
    ///
    /// Duplicate ids are collapsed, the batch is capped at
    /// [`MAX_PREFETCH_ASSETS`], and at most [`PREFETCH_CONCURRENCY`] upstream
    /// requests run at a time. Individual failures are logged and counted by
    /// the underlying cache; the batch itself never fails.
    pub async fn prefetch_many(&self, asset_ids: &[AssetId]) {
        let mut ids: Vec<AssetId> = Vec::with_capacity(asset_ids.len().min(MAX_PREFETCH_ASSETS));
        for &id in asset_ids {
            if !ids.contains(&id) {
                ids.push(id);
                if ids.len() == MAX_PREFETCH_ASSETS {
                    break;
                }
            }
        }

        metric!(counter("cache.prefetch.batch") += 1, "cache" => "components");
        metric!(histogram("cache.prefetch.batch_size") = ids.len() as u64, "cache" => "components");

        for chunk in ids.chunks(PREFETCH_CONCURRENCY) {
            future::join_all(chunk.iter().map(|id| self.prefetch(*id))).await;
        }
    }
}
