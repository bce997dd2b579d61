use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use sentry::{Hub, SentryFutureExt};
use serde::Serialize;

use crate::config::CacheSettings;
use crate::utils::defer;

use super::{CacheEntry, CacheError, CacheName, RefreshSet};

/// An item stored in the in-memory moka cache.
#[derive(Clone, Debug)]
pub struct InMemoryItem<T> {
    /// When this item was fetched from upstream.
    fetched_at: Instant,
    /// When to evict this item from the cache.
    deadline: Instant,
    /// Set by soft invalidation; forces the next access to refresh.
    stale: bool,
    /// The actual data.
    data: T,
}

impl<T> InMemoryItem<T> {
    fn fresh(data: T, gc_time: Duration) -> Self {
        let now = Instant::now();
        InMemoryItem {
            fetched_at: now,
            deadline: now + gc_time,
            stale: false,
            data,
        }
    }

    /// Whether this item is past its freshness window.
    ///
    /// A stale item is still served, but serving it schedules a background
    /// refresh.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.stale || self.fetched_at.elapsed() >= stale_time
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

type InMemoryCache<R> =
    moka::future::Cache<<R as CacheRequest>::Key, InMemoryItem<<R as CacheRequest>::Item>>;

/// A source of cacheable values, one implementation per cache.
///
/// Implementations hold whatever handles they need to perform the upstream
/// request (typically an `Arc<dyn InventoryApi>`), plus any bookkeeping hooks.
pub trait CacheRequest: Clone + Send + Sync + 'static {
    type Key: fmt::Debug + Hash + Eq + Clone + Send + Sync + 'static;
    type Item: Clone + Send + Sync + 'static;

    /// The name used for metrics and diagnostics.
    const NAME: CacheName;

    /// Fetches a fresh value for `key` from upstream.
    fn fetch(&self, key: &Self::Key) -> BoxFuture<'static, CacheEntry<Self::Item>>;

    /// The "cost" of keeping this item in the cache.
    fn weight(_item: &Self::Item) -> u32 {
        std::mem::size_of::<Self::Item>() as u32
    }

    /// Invoked whenever a freshly fetched value is about to be stored.
    ///
    /// Not invoked for mutation writes; those do not change which values are
    /// cached, only their contents.
    fn on_store(&self, _key: &Self::Key, _item: &Self::Item) {}
}

/// A keyed, TTL-based in-memory cache with request coalescing and
/// stale-while-revalidate background refreshes.
///
/// See the [module docs](crate::caching) for the freshness model.
pub struct Cacher<R: CacheRequest> {
    settings: CacheSettings,
    cache: InMemoryCache<R>,
    /// Keys with a currently running background refresh.
    refreshes: RefreshSet<R::Key>,
    /// Remaining budget of concurrent background refreshes.
    max_lazy_refreshes: Arc<AtomicIsize>,
    request: R,
}

impl<R: CacheRequest> fmt::Debug for Cacher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refreshes = self
            .refreshes
            .try_lock()
            .map(|r| r.len())
            .unwrap_or_default();
        f.debug_struct("Cacher")
            .field("name", &R::NAME)
            .field("entries", &self.cache.entry_count())
            .field("running refreshes", &refreshes)
            .finish()
    }
}

impl<R: CacheRequest> Clone for Cacher<R> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Cacher {
            settings: self.settings,
            cache: self.cache.clone(),
            refreshes: Arc::clone(&self.refreshes),
            max_lazy_refreshes: Arc::clone(&self.max_lazy_refreshes),
            request: self.request.clone(),
        }
    }
}

/// A struct implementing [`moka::Expiry`] that uses the [`InMemoryItem`]
/// [`Instant`] as the explicit expiration time.
struct CacheExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed (it is in the past relative to `current_time`), this
/// will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl<K, T> moka::Expiry<K, InMemoryItem<T>> for CacheExpiration {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &InMemoryItem<T>,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &InMemoryItem<T>,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// Diagnostic counters for one cache, exposed via the `cache/info` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub name: &'static str,
    /// Entries currently held, fresh or stale.
    pub entries: u64,
    /// Of those, entries past their freshness window.
    pub stale_entries: u64,
    /// Approximate weighted size in bytes.
    pub weighted_size: u64,
}

impl<R: CacheRequest> Cacher<R> {
    pub fn new(settings: CacheSettings, request: R) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(settings.capacity)
            .name(R::NAME.as_ref())
            .expire_after(CacheExpiration)
            // NOTE: we count the bookkeeping structures to the weight as well
            .weigher(|_k, v: &InMemoryItem<R::Item>| {
                std::mem::size_of::<(R::Key, Instant, Instant, bool)>() as u32 + R::weight(&v.data)
            })
            .build();

        // A zero budget would disable background refreshes entirely, which
        // turns every stale hit into a permanently stale hit.
        let max_lazy_refreshes = Arc::new(AtomicIsize::new(settings.max_lazy_refreshes.max(1)));

        Cacher {
            settings,
            cache,
            refreshes: Default::default(),
            max_lazy_refreshes,
            request,
        }
    }

    /// Looks up `key`, fetching it from upstream when missing or evicted.
    ///
    /// Fresh hits are served without network traffic. Stale hits are served
    /// immediately and additionally spawn one deduplicated background refresh.
    /// Misses block on a foreground fetch; concurrent misses for the same key
    /// are coalesced into a single upstream request, and all callers receive
    /// the same result.
    ///
    /// # Errors
    ///
    /// Only a foreground fetch can fail here. The error is not cached, so a
    /// subsequent access issues a new fetch.
    pub async fn get(&self, key: &R::Key) -> CacheEntry<R::Item> {
        metric!(counter("cache.access") += 1, "cache" => R::NAME.as_ref());

        if let Some(item) = self.cache.get(key).await {
            if item.is_stale(self.settings.stale_time) {
                metric!(counter("cache.hit.stale") += 1, "cache" => R::NAME.as_ref());
                self.spawn_refresh(key.clone());
            } else {
                metric!(counter("cache.hit") += 1, "cache" => R::NAME.as_ref());
            }
            return Ok(item.data);
        }

        metric!(counter("cache.miss") += 1, "cache" => R::NAME.as_ref());
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_try_insert_with(self.fetch_item(key))
            .await;

        match entry {
            Ok(entry) => Ok(entry.into_value().data),
            Err(e) => Err((*e).clone()),
        }
    }

    /// Opportunistically warms the cache for `key`.
    ///
    /// Does nothing when a fresh entry exists. Never returns an error:
    /// prefetching is best-effort, failures are counted and logged only.
    /// Concurrent prefetches (and foreground fetches) for the same key share
    /// one upstream request.
    pub async fn prefetch(&self, key: &R::Key) {
        if let Some(item) = self.cache.get(key).await {
            if item.is_stale(self.settings.stale_time) {
                self.spawn_refresh(key.clone());
            }
            return;
        }

        let entry = self
            .cache
            .entry_by_ref(key)
            .or_try_insert_with(self.fetch_item(key))
            .await;

        if let Err(error) = entry {
            metric!(counter("cache.prefetch.error") += 1, "cache" => R::NAME.as_ref());
            tracing::debug!(
                %error,
                cache = R::NAME.as_ref(),
                ?key,
                "prefetch failed"
            );
        }
    }

    /// Soft invalidation: removes the freshness guarantee for `key` while
    /// keeping the data, so the next access serves it and refreshes in the
    /// background.
    pub async fn mark_stale(&self, key: &R::Key) {
        if let Some(mut item) = self.cache.get(key).await {
            item.stale = true;
            self.cache.insert(key.clone(), item).await;
        }
    }

    /// Hard invalidation: evicts the entry outright, forcing the next access
    /// into a foreground fetch.
    pub async fn evict(&self, key: &R::Key) {
        self.cache.invalidate(key).await;
    }

    /// Raw entry access without freshness side effects.
    ///
    /// Used by the mutation orchestration to snapshot entries before touching
    /// them.
    pub async fn peek(&self, key: &R::Key) -> Option<InMemoryItem<R::Item>> {
        self.cache.get(key).await
    }

    /// Reinserts a previously [`peek`](Self::peek)ed item, restoring its exact
    /// data and timestamps. This is the rollback primitive.
    pub async fn restore(&self, key: R::Key, item: InMemoryItem<R::Item>) {
        self.cache.insert(key, item).await;
    }

    /// Read-modify-write of a cached entry's data in one store insert.
    ///
    /// Timestamps are preserved, so mutations do not extend an entry's
    /// lifetime. Returns `false` when nothing is cached for `key`.
    ///
    /// Concurrent writers race with last-write-wins semantics; readers always
    /// observe a fully applied state.
    pub async fn update(&self, key: &R::Key, f: impl FnOnce(&mut R::Item)) -> bool {
        match self.cache.get(key).await {
            Some(mut item) => {
                f(&mut item.data);
                self.cache.insert(key.clone(), item).await;
                true
            }
            None => false,
        }
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Diagnostic counters for this cache.
    pub async fn info(&self) -> CacheInfo {
        self.cache.run_pending_tasks().await;
        let stale_entries = self
            .cache
            .iter()
            .filter(|(_k, item)| item.is_stale(self.settings.stale_time))
            .count() as u64;
        CacheInfo {
            name: R::NAME.as_ref(),
            entries: self.cache.entry_count(),
            stale_entries,
            weighted_size: self.cache.weighted_size(),
        }
    }

    async fn fetch_item(&self, key: &R::Key) -> Result<InMemoryItem<R::Item>, CacheError> {
        metric!(counter("cache.fetch") += 1, "cache" => R::NAME.as_ref());
        let data = self.request.fetch(key).await?;
        self.request.on_store(key, &data);
        Ok(InMemoryItem::fresh(data, self.settings.gc_time))
    }

    /// Spawns a deduplicated background refresh for `key`.
    ///
    /// A stale entry is refreshed by at most one task at a time, and the
    /// number of concurrently running refreshes is bounded by the configured
    /// budget. Refresh failures keep the previous value in place.
    fn spawn_refresh(&self, key: R::Key) {
        let mut refreshes = self.refreshes.lock().unwrap();
        if refreshes.contains(&key) {
            return;
        }

        // We count down towards zero, and if we reach or surpass it, we will stop here.
        let max_lazy_refreshes = Arc::clone(&self.max_lazy_refreshes);
        if max_lazy_refreshes.fetch_sub(1, Ordering::Relaxed) <= 0 {
            max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);

            metric!(counter("cache.lazy_limit_hit") += 1, "cache" => R::NAME.as_ref());
            return;
        }

        let done_token = {
            let key = key.clone();
            let refreshes = Arc::clone(&self.refreshes);
            defer(move || {
                max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);
                refreshes.lock().unwrap().remove(&key);
            })
        };

        refreshes.insert(key.clone());
        drop(refreshes);

        tracing::trace!(
            cache = R::NAME.as_ref(),
            ?key,
            "Spawning deduplicated background refresh"
        );

        let this = self.clone();
        let task = async move {
            let _done_token = done_token; // move into the future

            match this.fetch_item(&key).await {
                Ok(item) => {
                    this.cache.insert(key, item).await;
                }
                Err(error) => {
                    // The stale value stays in place until it hits `gc_time`.
                    metric!(counter("cache.refresh.error") += 1, "cache" => R::NAME.as_ref());
                    tracing::warn!(
                        %error,
                        cache = R::NAME.as_ref(),
                        ?key,
                        "background refresh failed, serving stale data"
                    );
                }
            }
        };
        tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
    }
}
