//! # Assetwatch caching infrastructure
//!
//! Caching is front and center in assetwatch: every upstream listing the
//! dashboard reads goes through a keyed in-memory cache. This module contains
//! the generic cache, the central [`CacheError`] type, and the secondary
//! component index used by the matching workflow.
//!
//! ## Freshness model
//!
//! Every cache carries two windows per entry, `stale_time <= gc_time`:
//!
//! - Younger than `stale_time`: the entry is *fresh* and served without any
//!   network traffic.
//! - Between `stale_time` and `gc_time`: the entry is served immediately and a
//!   single deduplicated background refresh is spawned
//!   (stale-while-revalidate).
//! - Past `gc_time`: the entry is evicted by moka and the next access performs
//!   a blocking foreground fetch.
//!
//! Concurrent accesses for a missing key are coalesced into one upstream
//! request through moka's entry API; all waiters receive the same result. A
//! failed foreground fetch caches nothing, so the next access retries; a
//! failed background refresh is counted and logged while the stale value
//! continues to be served.
//!
//! ### Metrics
//!
//! All metrics are tagged with a `cache` field naming the cache:
//!
//! - `cache.access`: all accesses.
//! - `cache.hit` / `cache.hit.stale` / `cache.miss`: how an access was served.
//! - `cache.fetch`: upstream requests actually issued.
//! - `cache.refresh.error`: background refreshes that failed (swallowed).
//! - `cache.prefetch.error`: prefetch fetches that failed (swallowed).
//! - `cache.lazy_limit_hit`: refreshes skipped due to the concurrency limit.
//!
//! ## Mutation
//!
//! The matching workflow writes cached entries directly via
//! [`Cacher::peek`]/[`Cacher::update`]/[`Cacher::restore`]. Each write is a
//! single store insert, so readers observe either the previous or the next
//! state of an entry, never a half-applied one. Snapshot/rollback on top of
//! these primitives lives in [`crate::matching`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

mod cache_error;
mod config;
mod index;
mod memory;
#[cfg(test)]
mod tests;

pub use cache_error::{CacheEntry, CacheError};
pub use config::CacheName;
pub use index::ComponentIndex;
pub use memory::{CacheInfo, CacheRequest, Cacher, InMemoryItem};

/// Set of keys with an in-flight background refresh, used for deduplication.
pub(crate) type RefreshSet<K> = Arc<Mutex<HashSet<K>>>;
