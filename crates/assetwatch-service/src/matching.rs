//! The CPE matching workflow.
//!
//! Matching is the only write path in assetwatch. It is orchestrated as an
//! optimistic transaction against the component cache: before the upstream
//! matcher runs, every cached listing containing the component is snapshotted
//! and flagged as in progress; afterwards the flags are replaced by the
//! outcome, or the snapshots are restored verbatim when the upstream call
//! failed.

use std::sync::Arc;

use chrono::Utc;

use crate::aggregates::{DevicesCache, StatsCache};
use crate::caching::{CacheEntry, InMemoryItem};
use crate::components::ComponentsCache;
use crate::types::{AssetComponent, AssetId, ComponentId, ComponentsList, MatchMethod, MatchOutcome};
use crate::upstream::InventoryApi;

/// Snapshots of every cached listing a matching run touched.
///
/// Restoring them puts the cache byte-for-byte back into its pre-mutation
/// state, timestamps included.
struct MatchTransaction {
    component_id: ComponentId,
    snapshots: Vec<(AssetId, InMemoryItem<ComponentsList>)>,
}

/// Orchestrates matching runs against the upstream and the caches.
#[derive(Clone)]
pub struct CpeMatcher {
    api: Arc<dyn InventoryApi>,
    components: ComponentsCache,
    devices: DevicesCache,
    stats: StatsCache,
}

impl CpeMatcher {
    pub fn new(
        api: Arc<dyn InventoryApi>,
        components: ComponentsCache,
        devices: DevicesCache,
        stats: StatsCache,
    ) -> Self {
        Self {
            api,
            components,
            devices,
            stats,
        }
    }

    /// Runs the upstream matching pipeline for `component_id`.
    ///
    /// While the upstream call is in flight, the component shows
    /// `matching_in_progress` in every cached listing containing it. An
    /// upstream failure rolls all touched listings back to their exact
    /// previous state and propagates the error; `NeedsReview` and `Unmatched`
    /// are successful outcomes that only clear the flag again.
    pub async fn match_component(&self, component_id: ComponentId) -> CacheEntry<MatchOutcome> {
        metric!(counter("matching.run") += 1);
        let transaction = self.begin(component_id).await;

        let response = match self.api.trigger_matching(component_id).await {
            Ok(response) => response,
            Err(error) => {
                metric!(counter("matching.error") += 1);
                self.rollback(&transaction).await;
                return Err(error);
            }
        };

        let outcome = match response.into_outcome() {
            Ok(outcome) => outcome,
            Err(error) => {
                metric!(counter("matching.error") += 1);
                self.rollback(&transaction).await;
                return Err(error);
            }
        };

        metric!(counter("matching.outcome") += 1, "outcome" => outcome.tag());
        match &outcome {
            MatchOutcome::Resolved {
                method,
                cpe_string,
                confidence_score,
            } => {
                self.apply_resolution(&transaction, *method, cpe_string, *confidence_score)
                    .await;
            }
            MatchOutcome::NeedsReview { .. } | MatchOutcome::Unmatched { .. } => {
                self.clear_in_progress(&transaction).await;
            }
        }

        Ok(outcome)
    }

    /// Persists a manually selected CPE string for a component.
    ///
    /// Manual selection is a user-confirmed write, not a speculative one, so
    /// no in-progress flags are raised. Nothing in the cache changes unless
    /// the upstream accepted the selection.
    pub async fn select_manually(
        &self,
        component_id: ComponentId,
        cpe_string: &str,
    ) -> CacheEntry {
        self.api.select_cpe(component_id, cpe_string).await?;
        metric!(counter("matching.outcome") += 1, "outcome" => "manual");

        for asset_id in self.components.assets_containing(component_id) {
            self.write_component(asset_id, component_id, |component| {
                component.cpe_full_string = Some(cpe_string.to_owned());
                component.matching_in_progress = false;
                component.matching_method = Some(MatchMethod::Manual);
                component.confidence_score = None;
                component.updated_at = Utc::now();
            })
            .await;
        }

        self.invalidate_aggregates().await;
        Ok(())
    }

    /// Snapshots and flags every cached listing containing the component.
    ///
    /// Index entries pointing at evicted listings are skipped (and pruned by
    /// the peek). A component cached nowhere yields an empty transaction; the
    /// upstream run still proceeds.
    async fn begin(&self, component_id: ComponentId) -> MatchTransaction {
        let mut transaction = MatchTransaction {
            component_id,
            snapshots: Vec::new(),
        };

        for asset_id in self.components.assets_containing(component_id) {
            let Some(snapshot) = self.components.peek(asset_id).await else {
                continue;
            };
            transaction.snapshots.push((asset_id, snapshot));
            self.write_component(asset_id, component_id, |component| {
                component.matching_in_progress = true;
            })
            .await;
        }

        transaction
    }

    async fn rollback(&self, transaction: &MatchTransaction) {
        for (asset_id, snapshot) in &transaction.snapshots {
            self.components.restore(*asset_id, snapshot.clone()).await;
        }
        tracing::debug!(
            component_id = transaction.component_id,
            assets = transaction.snapshots.len(),
            "rolled back matching transaction"
        );
    }

    async fn apply_resolution(
        &self,
        transaction: &MatchTransaction,
        method: MatchMethod,
        cpe_string: &str,
        confidence_score: Option<f64>,
    ) {
        for (asset_id, _) in &transaction.snapshots {
            self.write_component(*asset_id, transaction.component_id, |component| {
                component.cpe_full_string = Some(cpe_string.to_owned());
                component.matching_in_progress = false;
                component.matching_method = Some(method);
                component.confidence_score = confidence_score;
                component.updated_at = Utc::now();
            })
            .await;
        }

        // Vulnerability counts derive from match state.
        self.invalidate_aggregates().await;
    }

    async fn clear_in_progress(&self, transaction: &MatchTransaction) {
        for (asset_id, _) in &transaction.snapshots {
            self.write_component(*asset_id, transaction.component_id, |component| {
                component.matching_in_progress = false;
            })
            .await;
        }
    }

    /// Applies `f` to every copy of `component_id` within one asset's cached
    /// listing, as a single cache write.
    async fn write_component(
        &self,
        asset_id: AssetId,
        component_id: ComponentId,
        f: impl Fn(&mut AssetComponent),
    ) {
        self.components
            .update(asset_id, |list| {
                for component in list
                    .iter_mut()
                    .filter(|c| c.component_id == component_id)
                {
                    f(component);
                }
            })
            .await;
    }

    async fn invalidate_aggregates(&self) {
        self.devices.invalidate().await;
        self.stats.invalidate().await;
    }
}
