//! Cache Manager Module
//!
//! Public entry point combining the in-memory store, the persistent tier,
//! background revalidation and cross-context invalidation.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::{InvalidationSignal, InvalidationSubscription, InvalidationTransport, NoopTransport};
use crate::cache::{
    CacheEntry, CacheSnapshot, CacheStore, Clock, Freshness, FreshnessPolicy, PersistOutcome,
    PersistentBackend, RevalidationCoordinator, SystemClock,
};
use crate::config::CacheConfig;
use crate::connectivity::{AlwaysOnline, ConnectivityProbe};
use crate::error::Result;
use crate::storage::{MemoryStorage, StorageBackend};

/// Type-erased payload held by the in-memory tier.
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

// == Cache Options ==
/// Per-call overrides of the manager defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub stale_while_revalidate: Option<bool>,
    /// Call the fetcher directly and leave both tiers untouched
    pub skip_cache: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = Some(enabled);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

/// What a lookup decided to do with the cached value.
enum Lookup<T> {
    Miss,
    Fresh(T),
    /// Stale but no way to refresh it right now
    Offline(T),
    Revalidate(T),
    /// Stale or expired, refetch in the foreground and fall back to this
    Refetch(T),
}

struct Inner {
    config: CacheConfig,
    store: RwLock<CacheStore<ErasedValue>>,
    persistent: PersistentBackend,
    revalidator: RevalidationCoordinator,
    transport: Box<dyn InvalidationTransport>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    /// Bumped under the store write lock by every removal; a fetch that
    /// started in an older epoch does not cache its result
    epoch: AtomicU64,
}

// == Cache Manager ==
/// Request cache sitting between data consumers and a remote fetch function.
///
/// Cloning is cheap and every clone shares the same tiers.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    /// Manager with in-memory storage and no cross-context signalling.
    pub fn new(config: CacheConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            storage: None,
            transport: None,
            connectivity: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn persistent(&self) -> &PersistentBackend {
        &self.inner.persistent
    }

    // == Get ==
    /// Returns the value for `key`, using `fetcher` when the cache cannot answer.
    ///
    /// - FRESH: cached value, no fetch.
    /// - STALE: cached value and a deduplicated background refresh when
    ///   stale-while-revalidate is on and the host is online; cached value
    ///   alone when offline; otherwise handled like EXPIRED.
    /// - EXPIRED or absent: awaits `fetcher`. On failure falls back to the
    ///   cached value, then to the persisted record, and only then returns
    ///   the fetcher's error.
    ///
    /// Skipped or no-persist keys call `fetcher` directly.
    pub async fn get<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: CacheOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let config = &self.inner.config;
        if options.skip_cache || config.is_no_persist(key) {
            debug!("Bypassing cache for '{}'", key);
            return fetcher().await;
        }

        let policy = FreshnessPolicy::new(
            config.stale_threshold,
            options.ttl.unwrap_or(config.ttl),
        );
        let swr = options
            .stale_while_revalidate
            .unwrap_or(config.stale_while_revalidate);

        let lookup = self.lookup::<T>(key, policy, swr).await;

        match lookup {
            Lookup::Fresh(data) | Lookup::Offline(data) => Ok(data),
            Lookup::Revalidate(data) => {
                self.schedule_revalidation(key, fetcher).await;
                Ok(data)
            }
            Lookup::Refetch(cached) => self.fetch_and_cache(key, fetcher, Some(cached)).await,
            Lookup::Miss => self.fetch_and_cache(key, fetcher, None).await,
        }
    }

    async fn lookup<T>(&self, key: &str, policy: FreshnessPolicy, swr: bool) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = self.inner.clock.now_ms();
        let mut store = self.inner.store.write().await;

        let cached = store.get(key).and_then(|entry| {
            let data = entry.data.downcast_ref::<T>().cloned();
            if data.is_none() {
                debug!("Cached '{}' holds a different type, treating as absent", key);
            }
            data.map(|data| (data, entry.timestamp))
        });

        let Some((data, timestamp)) = cached else {
            store.stats_mut().record_miss();
            return Lookup::Miss;
        };

        match policy.classify(timestamp, now) {
            Freshness::Fresh => {
                store.stats_mut().record_hit();
                debug!("Fresh hit for '{}'", key);
                Lookup::Fresh(data)
            }
            Freshness::Stale if !self.inner.connectivity.is_online() => {
                store.stats_mut().record_stale_hit();
                debug!("Offline, serving stale '{}' without refresh", key);
                Lookup::Offline(data)
            }
            Freshness::Stale if swr => {
                store.stats_mut().record_stale_hit();
                debug!("Stale hit for '{}', revalidating in background", key);
                Lookup::Revalidate(data)
            }
            Freshness::Stale | Freshness::Expired => {
                store.stats_mut().record_miss();
                Lookup::Refetch(data)
            }
        }
    }

    async fn fetch_and_cache<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        cached: Option<T>,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let epoch = self.epoch();
        let err = match fetcher().await {
            Ok(data) => {
                self.store_fresh(key, &data, epoch).await;
                return Ok(data);
            }
            Err(err) => err,
        };

        if let Some(data) = cached {
            warn!("Fetch for '{}' failed ({}), serving cached value", key, err);
            return Ok(data);
        }

        let now = self.inner.clock.now_ms();
        if let Some(data) = self.inner.persistent.load_fallback::<T>(key, now) {
            warn!("Fetch for '{}' failed ({}), serving persisted value", key, err);
            return Ok(data);
        }

        debug!("Fetch for '{}' failed with no fallback available", key);
        Err(err)
    }

    async fn schedule_revalidation<T, E, F, Fut>(&self, key: &str, fetcher: F)
    where
        T: Serialize + Clone + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let manager = self.clone();
        let owned_key = key.to_string();
        let epoch = self.epoch();
        let refresh = async move {
            match fetcher().await {
                Ok(data) => {
                    if manager.store_fresh(&owned_key, &data, epoch).await {
                        debug!("Revalidated '{}'", owned_key);
                    }
                }
                Err(e) => warn!("Background revalidation of '{}' failed: {}", owned_key, e),
            }
        };

        self.inner.revalidator.schedule(key, refresh).await;
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Replaces the entry for `key` in memory and mirrors it to storage.
    ///
    /// Returns false, caching nothing, if anything was removed since the
    /// fetch started in `epoch`.
    async fn store_fresh<T>(&self, key: &str, data: &T, epoch: u64) -> bool
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let now = self.inner.clock.now_ms();
        let erased: ErasedValue = Arc::new(data.clone());

        // Held through the persistent write so a removal cannot interleave
        let mut store = self.inner.store.write().await;
        if self.epoch() != epoch {
            debug!("Cache changed while fetching '{}', result not stored", key);
            return false;
        }

        let evicted = store.insert(CacheEntry::new(key, erased, now));
        if evicted > 0 {
            debug!("Evicted {} entries to make room for '{}'", evicted, key);
        }

        match self.inner.persistent.persist(key, data, now) {
            Ok(PersistOutcome::Written) => {}
            Ok(PersistOutcome::Dropped) => {
                debug!("Persistent tier full, '{}' kept in memory only", key)
            }
            Err(e) => warn!("Skipping persistence of '{}': {}", key, e),
        }
        true
    }

    // == Invalidate ==
    /// Removes `key` from both tiers. No-op if absent.
    pub async fn invalidate(&self, key: &str) {
        let mut store = self.inner.store.write().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = store.remove(key);
        if let Err(e) = self.inner.persistent.remove(key) {
            warn!("Failed to remove persisted '{}': {}", key, e);
        }
        debug!("Invalidated '{}' (in memory: {})", key, removed);
    }

    // == Invalidate Pattern ==
    /// Removes every key matching the regex `pattern` from both tiers, then
    /// tells other contexts to do the same.
    ///
    /// Returns the number of distinct keys removed here. An invalid pattern
    /// removes nothing and is not broadcast.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern)?;
        let removed = self.remove_matching(&regex).await;

        let signal = InvalidationSignal::new(pattern, self.inner.clock.now_ms());
        if let Err(e) = self.inner.transport.publish(&signal) {
            warn!("Failed to broadcast invalidation of '{}': {}", pattern, e);
        }

        info!("Invalidated {} keys matching '{}'", removed, pattern);
        Ok(removed)
    }

    /// Applies a signal received from another context, without re-broadcasting.
    pub async fn apply_signal(&self, signal: &InvalidationSignal) -> Result<usize> {
        let regex = Regex::new(&signal.pattern)?;
        let removed = self.remove_matching(&regex).await;
        info!(
            "Applied remote invalidation '{}': {} keys removed",
            signal.pattern, removed
        );
        Ok(removed)
    }

    async fn remove_matching(&self, regex: &Regex) -> usize {
        let mut store = self.inner.store.write().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let mut removed: BTreeSet<String> = store
            .remove_where(|key| regex.is_match(key))
            .into_iter()
            .collect();

        match self.inner.persistent.remove_where(|key| regex.is_match(key)) {
            Ok(keys) => removed.extend(keys),
            Err(e) => warn!("Failed to remove persisted matches of '{}': {}", regex, e),
        }

        removed.len()
    }

    // == Clear ==
    /// Empties both tiers.
    pub async fn clear(&self) {
        let mut store = self.inner.store.write().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        store.clear();
        match self.inner.persistent.clear() {
            Ok(count) => info!("Cache cleared, {} persisted records removed", count),
            Err(e) => warn!("Failed to clear persisted cache: {}", e),
        }
    }

    // == Stats ==
    /// Diagnostic snapshot. Has no side effects.
    pub async fn stats(&self) -> CacheSnapshot {
        let revalidations_in_flight = self.inner.revalidator.in_flight().await;
        let store = self.inner.store.read().await;
        let stats = store.stats();

        CacheSnapshot {
            size: store.len(),
            max_size: store.max_entries(),
            ttl_ms: self.inner.config.ttl.as_millis() as u64,
            storage_usage_mb: format!("{:.2}", self.inner.persistent.usage_mb()),
            keys: store.keys(),
            hits: stats.hits,
            misses: stats.misses,
            stale_hits: stats.stale_hits,
            evictions: stats.evictions,
            revalidations_in_flight,
            hit_rate: stats.hit_rate(),
        }
    }

    /// Returns true while a background refresh of `key` is running.
    pub async fn is_revalidating(&self, key: &str) -> bool {
        self.inner.revalidator.is_pending(key).await
    }

    /// Subscribes to invalidations published by other contexts.
    pub fn subscribe(&self) -> Option<InvalidationSubscription> {
        self.inner.transport.subscribe()
    }
}

// == Builder ==
/// Wires the host capabilities a manager depends on.
///
/// Unset capabilities default to unbounded in-memory storage, no
/// cross-context transport, an always-online probe and the system clock.
pub struct CacheManagerBuilder {
    config: CacheConfig,
    storage: Option<Arc<dyn StorageBackend>>,
    transport: Option<Box<dyn InvalidationTransport>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CacheManagerBuilder {
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: impl InvalidationTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> CacheManager {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let persistent = PersistentBackend::new(
            storage,
            self.config.max_storage_bytes(),
            self.config.fallback_max_age,
        );

        CacheManager {
            inner: Arc::new(Inner {
                store: RwLock::new(CacheStore::new(self.config.max_entries)),
                persistent,
                revalidator: RevalidationCoordinator::new(),
                transport: self.transport.unwrap_or_else(|| Box::new(NoopTransport)),
                connectivity: self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline)),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                config: self.config,
                epoch: AtomicU64::new(0),
            }),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::connectivity::ConnectivityFlag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        manager: CacheManager,
        clock: Arc<ManualClock>,
        storage: Arc<MemoryStorage>,
        online: Arc<ConnectivityFlag>,
    }

    fn harness(config: CacheConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let storage = Arc::new(MemoryStorage::new());
        let online = Arc::new(ConnectivityFlag::new(true));
        let manager = CacheManager::builder(config)
            .storage(storage.clone())
            .clock(clock.clone())
            .connectivity(online.clone())
            .build();
        Harness {
            manager,
            clock,
            storage,
            online,
        }
    }

    fn config() -> CacheConfig {
        CacheConfig::default()
            .with_ttl(Duration::from_millis(200))
            .with_stale_threshold(Duration::from_millis(50))
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> std::future::Ready<std::result::Result<String, String>> + Send + 'static
    {
        let calls = calls.clone();
        let value = value.to_string();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    fn failing() -> impl FnOnce() -> std::future::Ready<std::result::Result<String, String>> + Send + 'static
    {
        || std::future::ready(Err("network down".to_string()))
    }

    async fn settle(manager: &CacheManager, key: &str) {
        for _ in 0..200 {
            if !manager.is_revalidating(key).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("revalidation of '{}' did not settle", key);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores_both_tiers() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        let value = h
            .manager
            .get("products", counting(&calls, "v1"), CacheOptions::new())
            .await;

        assert_eq!(assert_ok!(value), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.storage.get_item("cache_products").unwrap().is_some());
        assert_eq!(h.manager.stats().await.keys, vec!["products"]);
    }

    #[tokio::test]
    async fn test_offline_stale_serves_without_fetch() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(60));
        h.online.set_online(false);

        let value = h
            .manager
            .get("p", counting(&calls, "v2"), CacheOptions::new())
            .await
            .unwrap();

        assert_eq!(value, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!h.manager.is_revalidating("p").await);
    }

    #[tokio::test]
    async fn test_swr_disabled_refetches_stale_in_foreground() {
        let h = harness(config().with_stale_while_revalidate(false));
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(60));

        let value = h
            .manager
            .get("p", counting(&calls, "v2"), CacheOptions::new())
            .await
            .unwrap();

        assert_eq!(value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_call_swr_override() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(60));

        let options = CacheOptions::new().with_stale_while_revalidate(false);
        let value = h
            .manager
            .get("p", counting(&calls, "v2"), options)
            .await
            .unwrap();

        assert_eq!(value, "v2");
    }

    #[tokio::test]
    async fn test_per_call_ttl_override() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(30));

        // 20 ms ttl: entry is already expired
        let options = CacheOptions::new().with_ttl(Duration::from_millis(20));
        let value = h
            .manager
            .get("p", counting(&calls, "v2"), options)
            .await
            .unwrap();

        assert_eq!(value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_background_failure_is_swallowed() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(60));

        let value = h.manager.get("p", failing(), CacheOptions::new()).await;
        assert_eq!(assert_ok!(value), "v1");
        settle(&h.manager, "p").await;

        // Entry untouched by the failed refresh
        let value = h
            .manager
            .get("p", failing(), CacheOptions::new().with_stale_while_revalidate(false))
            .await;
        assert_eq!(assert_ok!(value), "v1");
    }

    #[tokio::test]
    async fn test_absent_failure_uses_persisted_fallback() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();

        // Simulate a reload: fresh manager over the same storage
        let reloaded = CacheManager::builder(config())
            .storage(h.storage.clone())
            .clock(h.clock.clone())
            .build();

        let value = reloaded.get("p", failing(), CacheOptions::new()).await;
        assert_eq!(assert_ok!(value), "v1");
    }

    #[tokio::test]
    async fn test_persisted_fallback_respects_ceiling() {
        let h = harness(config().with_fallback_max_age(Duration::from_secs(3600)));
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(3601));

        let reloaded = CacheManager::builder(config())
            .storage(h.storage.clone())
            .clock(h.clock.clone())
            .build();

        let value = reloaded.get("p", failing(), CacheOptions::new()).await;
        assert_eq!(assert_err!(value), "network down");
    }

    #[tokio::test]
    async fn test_type_mismatch_is_treated_as_absent() {
        let h = harness(config());

        let _: String = h
            .manager
            .get("p", || async { Ok::<_, String>("text".to_string()) }, CacheOptions::new())
            .await
            .unwrap();

        let number: u32 = h
            .manager
            .get("p", || async { Ok::<_, String>(7u32) }, CacheOptions::new())
            .await
            .unwrap();

        assert_eq!(number, 7);
    }

    #[tokio::test]
    async fn test_invalidate_removes_both_tiers() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.manager.invalidate("p").await;
        // Absent key is a no-op
        h.manager.invalidate("never-cached").await;

        assert!(h.storage.get_item("cache_p").unwrap().is_none());
        assert_eq!(h.manager.stats().await.size, 0);
        assert_eq!(h.manager.persistent().usage_bytes(), 0);
    }

    #[tokio::test]
    async fn test_clear_during_refresh_is_not_undone() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());

        h.manager
            .get("p", counting(&calls, "v1"), CacheOptions::new())
            .await
            .unwrap();
        h.clock.advance(Duration::from_millis(60));

        let held = gate.clone();
        let value = h
            .manager
            .get(
                "p",
                move || async move {
                    held.notified().await;
                    Ok::<_, String>("v2".to_string())
                },
                CacheOptions::new(),
            )
            .await;
        assert_eq!(assert_ok!(value), "v1");

        h.manager.clear().await;
        gate.notify_one();
        settle(&h.manager, "p").await;

        assert_eq!(h.manager.stats().await.size, 0);
        assert!(h.storage.get_item("cache_p").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_during_foreground_fetch_is_not_undone() {
        let h = harness(config());
        let gate = Arc::new(tokio::sync::Notify::new());

        let manager = h.manager.clone();
        let held = gate.clone();
        let fetch = tokio::spawn(async move {
            manager
                .get(
                    "p",
                    move || async move {
                        held.notified().await;
                        Ok::<_, String>("v1".to_string())
                    },
                    CacheOptions::new(),
                )
                .await
        });

        // Let the fetch start before invalidating
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.manager.invalidate("p").await;
        gate.notify_one();

        // The caller still gets its value; the cache stays empty
        assert_eq!(fetch.await.unwrap().unwrap(), "v1");
        assert_eq!(h.manager.stats().await.size, 0);
        assert!(h.storage.get_item("cache_p").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_error() {
        let h = harness(config());
        let result = h.manager.invalidate_pattern("(unclosed").await;
        assert!(matches!(result, Err(crate::error::CacheError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_clear_empties_both_tiers() {
        let h = harness(config());
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            h.manager
                .get(key, counting(&calls, "v"), CacheOptions::new())
                .await
                .unwrap();
        }
        h.storage.set_item("unrelated", "keep").unwrap();

        h.manager.clear().await;

        let stats = h.manager.stats().await;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.storage_usage_mb, "0.00");
        assert_eq!(h.storage.keys().unwrap(), vec!["unrelated"]);
    }

    #[tokio::test]
    async fn test_stats_counts_outcomes() {
        let h = harness(config().with_max_entries(10));
        let calls = Arc::new(AtomicUsize::new(0));

        // miss, hit, stale hit
        for advance in [0, 10, 50] {
            h.clock.advance(Duration::from_millis(advance));
            h.manager
                .get("p", counting(&calls, "v"), CacheOptions::new())
                .await
                .unwrap();
        }
        settle(&h.manager, "p").await;

        let stats = h.manager.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.ttl_ms, 200);
        assert_eq!(stats.revalidations_in_flight, 0);
    }

    #[tokio::test]
    async fn test_unserializable_payload_still_cached_in_memory() {
        use std::collections::HashMap;

        let h = harness(config());
        let mut payload: HashMap<Vec<u8>, u32> = HashMap::new();
        payload.insert(vec![1], 1);

        let first = payload.clone();
        h.manager
            .get("bin", move || async move { Ok::<_, String>(first) }, CacheOptions::new())
            .await
            .unwrap();

        assert!(h.storage.get_item("cache_bin").unwrap().is_none());

        let cached: HashMap<Vec<u8>, u32> = h
            .manager
            .get("bin", || async { Err::<HashMap<Vec<u8>, u32>, _>("unused".to_string()) }, CacheOptions::new())
            .await
            .unwrap();
        assert_eq!(cached, payload);
    }
}
