use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{self, BoxFuture};

use crate::config::CacheSettings;

use super::{CacheEntry, CacheError, CacheName, CacheRequest, Cacher};

/// A request that counts upstream fetches and can be told to fail or stall.
#[derive(Clone, Default)]
struct CountingRequest {
    fetches: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingRequest {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CacheRequest for CountingRequest {
    type Key = u32;
    type Item = String;

    const NAME: CacheName = CacheName::Components;

    fn fetch(&self, key: &Self::Key) -> BoxFuture<'static, CacheEntry<Self::Item>> {
        let key = *key;
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(CacheError::Upstream("upstream down".into()));
            }
            Ok(format!("value-{key}-{n}"))
        })
    }
}

fn settings(stale_ms: u64, gc_ms: u64) -> CacheSettings {
    CacheSettings {
        stale_time: Duration::from_millis(stale_ms),
        gc_time: Duration::from_millis(gc_ms),
        capacity: 1024 * 1024,
        max_lazy_refreshes: 20,
    }
}

/// A fresh hit is served without touching upstream.
#[tokio::test]
async fn test_fresh_hit_is_free() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(1_000, 10_000), request.clone());

    let first = cacher.get(&1).await.unwrap();
    assert_eq!(first, "value-1-0");
    assert_eq!(request.fetches(), 1);

    for _ in 0..10 {
        assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    }
    assert_eq!(request.fetches(), 1);
}

/// Past `gc_time` the entry is gone and the next access pays for a blocking
/// refetch.
#[tokio::test]
async fn test_expired_entry_is_refetched() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(10, 50), request.clone());

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-1");
    assert_eq!(request.fetches(), 2);
}

/// Concurrent misses for the same key are coalesced into one upstream
/// request, and every caller gets the same value.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_gets_are_deduplicated() {
    assetwatch_test::setup();
    let request = CountingRequest {
        delay: Duration::from_millis(50),
        ..Default::default()
    };
    let cacher = Cacher::new(settings(1_000, 10_000), request.clone());

    let results = future::join_all((0..20).map(|_| {
        let cacher = cacher.clone();
        tokio::spawn(async move { cacher.get(&7).await })
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().unwrap(), "value-7-0");
    }
    assert_eq!(request.fetches(), 1);
}

/// Prefetching an uncached key fetches it once; concurrent prefetches and
/// gets share the same in-flight request.
#[tokio::test(flavor = "multi_thread")]
async fn test_prefetch_is_idempotent() {
    assetwatch_test::setup();
    let request = CountingRequest {
        delay: Duration::from_millis(50),
        ..Default::default()
    };
    let cacher = Cacher::new(settings(1_000, 10_000), request.clone());

    future::join_all((0..10).map(|_| {
        let cacher = cacher.clone();
        tokio::spawn(async move { cacher.prefetch(&3).await })
    }))
    .await;

    assert_eq!(request.fetches(), 1);
    // the user-facing access afterwards is a fresh hit
    assert_eq!(cacher.get(&3).await.unwrap(), "value-3-0");
    assert_eq!(request.fetches(), 1);
}

/// Prefetch failures are swallowed and not cached.
#[tokio::test]
async fn test_prefetch_failure_is_silent() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    request.fail.store(true, Ordering::SeqCst);
    let cacher = Cacher::new(settings(1_000, 10_000), request.clone());

    cacher.prefetch(&1).await;
    assert_eq!(request.fetches(), 1);

    // upstream recovers, the next get succeeds with a new fetch
    request.fail.store(false, Ordering::SeqCst);
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-1");
}

/// Between `stale_time` and `gc_time` the old value is served immediately
/// while a refresh runs in the background.
#[tokio::test(flavor = "multi_thread")]
async fn test_stale_while_revalidate() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    // generous stale window so the refreshed entry is still fresh when the
    // last assertion reads it
    let cacher = Cacher::new(settings(200, 10_000), request.clone());

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    tokio::time::sleep(Duration::from_millis(250)).await;

    // stale hit: old value, refresh spawned
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(request.fetches(), 2);
    // the refreshed value is now fresh again
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-1");
    assert_eq!(request.fetches(), 2);
}

/// A failed background refresh keeps the stale value in place.
#[tokio::test(flavor = "multi_thread")]
async fn test_failed_refresh_serves_stale() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(200, 10_000), request.clone());

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    tokio::time::sleep(Duration::from_millis(250)).await;

    request.fail.store(true, Ordering::SeqCst);
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // refresh ran and failed, old value still there
    assert_eq!(request.fetches(), 2);
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
}

/// Foreground fetch errors propagate to the caller and are never cached, so
/// the next access retries.
#[tokio::test]
async fn test_errors_are_not_cached() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    request.fail.store(true, Ordering::SeqCst);
    let cacher = Cacher::new(settings(1_000, 10_000), request.clone());

    let err = cacher.get(&1).await.unwrap_err();
    assert_eq!(err, CacheError::Upstream("upstream down".into()));
    assert_eq!(request.fetches(), 1);

    request.fail.store(false, Ordering::SeqCst);
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-1");
    assert_eq!(request.fetches(), 2);
}

/// Soft invalidation keeps serving the data while forcing a refresh; hard
/// invalidation forces a blocking refetch.
#[tokio::test(flavor = "multi_thread")]
async fn test_invalidation() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(10_000, 60_000), request.clone());

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    assert_eq!(cacher.get(&2).await.unwrap(), "value-2-1");

    cacher.mark_stale(&1).await;
    // old data served, background refresh spawned
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-2");

    cacher.evict(&2).await;
    assert_eq!(cacher.get(&2).await.unwrap(), "value-2-3");
}

/// `update` rewrites the data in place without extending the entry lifetime,
/// `peek`/`restore` round-trip an entry exactly.
#[tokio::test]
async fn test_update_and_restore() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(10_000, 60_000), request.clone());

    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    let snapshot = cacher.peek(&1).await.unwrap();

    assert!(cacher.update(&1, |data| data.push_str("-edited")).await);
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0-edited");

    cacher.restore(1, snapshot).await;
    assert_eq!(cacher.get(&1).await.unwrap(), "value-1-0");
    // none of this went upstream
    assert_eq!(request.fetches(), 1);

    // updating an uncached key is a no-op
    assert!(!cacher.update(&9, |data| data.clear()).await);
}

#[tokio::test]
async fn test_cache_info() {
    assetwatch_test::setup();
    let request = CountingRequest::default();
    let cacher = Cacher::new(settings(10_000, 60_000), request.clone());

    cacher.get(&1).await.unwrap();
    cacher.get(&2).await.unwrap();
    cacher.mark_stale(&2).await;

    let info = cacher.info().await;
    assert_eq!(info.name, "components");
    assert_eq!(info.entries, 2);
    assert_eq!(info.stale_entries, 1);
    assert!(info.weighted_size > 0);

    cacher.clear();
    let info = cacher.info().await;
    assert_eq!(info.entries, 0);
}
