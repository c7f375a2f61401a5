// Read-through cache front with refresh-ahead on stale reads

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, EntryState};
use super::storage::MemoryStore;
use super::{CacheStore, SqliteStore};
use crate::config::CacheConfig;
use crate::core::PreviewResult;
use crate::freshness::FreshnessPolicy;
use crate::logger::{self, LogTag};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Where a served value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServedFrom {
    Fresh,
    /// Past its fresh window; a background refresh was triggered
    Stale,
    /// Fetched from the data source during this call
    Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub origin: ServedFrom,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub entry: CacheEntry,
    pub state: EntryState,
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub fresh_hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub store_errors: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.fresh_hits + self.stale_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

pub struct DurableCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    metrics: Mutex<CacheMetrics>,
    /// Keys with a background refresh outstanding
    refreshing: Mutex<HashSet<String>>,
}

impl DurableCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            metrics: Mutex::new(CacheMetrics::default()),
            refreshing: Mutex::new(HashSet::new()),
        }
    }

    /// SQLite when enabled and openable, otherwise the in-memory map
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let store: Arc<dyn CacheStore> = if config.durable_enabled {
            match SqliteStore::open(&config.database_path) {
                Ok(store) => {
                    logger::info(
                        LogTag::Cache,
                        &format!("Durable cache opened at {}", config.database_path),
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    logger::error(
                        LogTag::Cache,
                        &format!(
                            "Failed to open durable cache at {}, using in-memory store: {}",
                            config.database_path, e
                        ),
                    );
                    Arc::new(MemoryStore::new(config.memory_capacity))
                }
            }
        } else {
            logger::info(
                LogTag::Cache,
                &format!(
                    "Durable cache disabled, using in-memory store (capacity {})",
                    config.memory_capacity
                ),
            );
            Arc::new(MemoryStore::new(config.memory_capacity))
        };
        Self::new(store, clock)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Entry and its state at the current instant, expired entries included
    pub fn get(&self, key: &str) -> PreviewResult<Option<CacheLookup>> {
        let now = self.clock.now();
        Ok(self.store.load(key)?.map(|entry| {
            let state = entry.state_at(now);
            CacheLookup { entry, state }
        }))
    }

    pub fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        fresh_secs: u64,
        stale_secs: u64,
    ) -> PreviewResult<()> {
        let entry = CacheEntry::with_ttl(
            key,
            serde_json::to_string(value)?,
            self.clock.now(),
            fresh_secs,
            stale_secs,
        );
        self.save(&entry)
    }

    pub fn set_with_policy<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: &FreshnessPolicy,
    ) -> PreviewResult<()> {
        let entry = CacheEntry::encode(key, value, self.clock.now(), policy)?;
        self.save(&entry)
    }

    fn save(&self, entry: &CacheEntry) -> PreviewResult<()> {
        self.store.save(entry)?;
        self.metrics.lock().stores += 1;
        Ok(())
    }

    pub fn invalidate(&self, key: &str) -> PreviewResult<bool> {
        let removed = self.store.remove(key)?;
        if removed {
            logger::debug(LogTag::Cache, &format!("Invalidated {}", key));
        }
        Ok(removed)
    }

    pub fn purge_expired(&self) -> PreviewResult<usize> {
        let removed = self.store.purge_expired(self.clock.now())?;
        if removed > 0 {
            logger::info(
                LogTag::Cache,
                &format!("Purged {} expired entries from {} store", removed, self.backend_name()),
            );
        }
        Ok(removed)
    }

    pub fn len(&self) -> PreviewResult<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> PreviewResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.lock()
    }

    pub fn refreshes_in_flight(&self) -> usize {
        self.refreshing.lock().len()
    }

    /// Serve `key` under `policy`. FRESH returns the cached value without
    /// calling `fetch`. STALE returns the cached value and refreshes it in a
    /// detached task. EXPIRED or absent awaits `fetch` and stores the result;
    /// a fetch failure is returned to the caller only in this case.
    pub async fn get_or_fetch<T, F, Fut>(
        self: &Arc<Self>,
        key: &str,
        policy: &FreshnessPolicy,
        fetch: F,
    ) -> PreviewResult<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PreviewResult<T>> + Send + 'static,
    {
        if let Some(lookup) = self.lookup_servable(key) {
            match lookup.entry.decode::<T>() {
                Ok(value) => {
                    let origin = if lookup.state == EntryState::Fresh {
                        self.metrics.lock().fresh_hits += 1;
                        logger::debug(LogTag::Cache, &format!("Fresh hit for {}", key));
                        ServedFrom::Fresh
                    } else {
                        self.metrics.lock().stale_hits += 1;
                        logger::debug(LogTag::Cache, &format!("Stale hit for {}", key));
                        self.spawn_refresh(key, *policy, fetch);
                        ServedFrom::Stale
                    };
                    return Ok(Cached {
                        value,
                        origin,
                        stored_at: lookup.entry.stored_at,
                    });
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Cache,
                        &format!("Discarding unreadable entry: {}", e),
                    );
                    if let Err(e) = self.store.remove(key) {
                        self.record_store_error(key, &e.to_string());
                    }
                }
            }
        }

        self.metrics.lock().misses += 1;
        logger::debug(LogTag::Cache, &format!("Miss for {}, fetching from source", key));

        let value = fetch().await?;
        let stored_at = self.clock.now();
        if let Err(e) = self.set_with_policy(key, &value, policy) {
            self.record_store_error(key, &e.to_string());
        }

        Ok(Cached {
            value,
            origin: ServedFrom::Origin,
            stored_at,
        })
    }

    /// Fresh or stale entry for `key`; store failures read as a miss
    fn lookup_servable(&self, key: &str) -> Option<CacheLookup> {
        match self.get(key) {
            Ok(Some(lookup)) if lookup.state != EntryState::Expired => Some(lookup),
            Ok(_) => None,
            Err(e) => {
                self.record_store_error(key, &e.to_string());
                None
            }
        }
    }

    fn record_store_error(&self, key: &str, error: &str) {
        self.metrics.lock().store_errors += 1;
        logger::error(
            LogTag::Cache,
            &format!("Cache store error for {} ({}): {}", key, self.backend_name(), error),
        );
    }

    fn spawn_refresh<T, F, Fut>(self: &Arc<Self>, key: &str, policy: FreshnessPolicy, fetch: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PreviewResult<T>> + Send + 'static,
    {
        if !self.refreshing.lock().insert(key.to_string()) {
            logger::debug(LogTag::Cache, &format!("Refresh already running for {}", key));
            return;
        }

        let guard = RefreshGuard {
            cache: Arc::clone(self),
            key: key.to_string(),
        };
        let cache = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            match fetch().await {
                Ok(value) => match cache.set_with_policy(&key, &value, &policy) {
                    Ok(()) => {
                        cache.metrics.lock().refreshes += 1;
                        logger::debug(LogTag::Cache, &format!("Refreshed {}", key));
                    }
                    Err(e) => cache.record_store_error(&key, &e.to_string()),
                },
                Err(e) => {
                    cache.metrics.lock().refresh_failures += 1;
                    logger::warning(
                        LogTag::Cache,
                        &format!("Background refresh failed for {}, keeping stale entry: {}", key, e),
                    );
                }
            }
        });
    }
}

/// Clears a key from the refreshing set when its task ends, even by panic
struct RefreshGuard {
    cache: Arc<DurableCache>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.cache.refreshing.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::core::PreviewError;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    fn public_policy() -> FreshnessPolicy {
        FreshnessPolicy {
            fresh_seconds: 3_600,
            stale_seconds: 7_200,
            is_public: true,
        }
    }

    fn setup() -> (Arc<DurableCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = Arc::new(DurableCache::new(
            Arc::new(MemoryStore::new(16)),
            clock.clone(),
        ));
        (cache, clock)
    }

    async fn settle(cache: &DurableCache) {
        for _ in 0..200 {
            if cache.refreshes_in_flight() == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("background refresh did not finish");
    }

    #[test]
    fn test_freshness_law() {
        let (cache, clock) = setup();
        cache.set("global:alpha", &42u64, 60, 120).unwrap();

        assert_eq!(cache.get("global:alpha").unwrap().unwrap().state, EntryState::Fresh);
        clock.advance(Duration::seconds(60));
        assert_eq!(cache.get("global:alpha").unwrap().unwrap().state, EntryState::Stale);
        clock.advance(Duration::seconds(60));
        assert_eq!(cache.get("global:alpha").unwrap().unwrap().state, EntryState::Expired);

        assert!(cache.invalidate("global:alpha").unwrap());
        assert!(cache.get("global:alpha").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_fetches_and_stores() {
        let (cache, _clock) = setup();
        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async { Ok(7u64) })
            .await
            .unwrap();

        assert_eq!(served.value, 7);
        assert_eq!(served.origin, ServedFrom::Origin);
        assert_eq!(cache.get("global:alpha").unwrap().unwrap().state, EntryState::Fresh);
        assert_eq!(cache.metrics().misses, 1);
        assert_eq!(cache.metrics().stores, 1);
    }

    #[tokio::test]
    async fn test_fresh_read_skips_source() {
        let (cache, _clock) = setup();
        cache.set_with_policy("global:alpha", &1u64, &public_policy()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(2u64)
            })
            .await
            .unwrap();

        assert_eq!(served.value, 1);
        assert_eq!(served.origin, ServedFrom::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_read_refreshes_in_background() {
        let (cache, clock) = setup();
        cache.set_with_policy("global:alpha", &1u64, &public_policy()).unwrap();
        clock.advance(Duration::seconds(4_000));

        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async { Ok(2u64) })
            .await
            .unwrap();
        assert_eq!(served.value, 1);
        assert_eq!(served.origin, ServedFrom::Stale);

        settle(&cache).await;
        let lookup = cache.get("global:alpha").unwrap().unwrap();
        assert_eq!(lookup.state, EntryState::Fresh);
        assert_eq!(lookup.entry.decode::<u64>().unwrap(), 2);
        assert_eq!(lookup.entry.stored_at, t0() + Duration::seconds(4_000));
        assert_eq!(cache.metrics().refreshes, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_entry() {
        let (cache, clock) = setup();
        cache.set_with_policy("global:alpha", &1u64, &public_policy()).unwrap();
        clock.advance(Duration::seconds(4_000));

        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async {
                Err::<u64, _>(PreviewError::source_unavailable("api", "down"))
            })
            .await
            .unwrap();
        assert_eq!(served.value, 1);

        settle(&cache).await;
        let lookup = cache.get("global:alpha").unwrap().unwrap();
        assert_eq!(lookup.state, EntryState::Stale);
        assert_eq!(lookup.entry.decode::<u64>().unwrap(), 1);
        assert_eq!(cache.metrics().refresh_failures, 1);
    }

    #[tokio::test]
    async fn test_panicking_refresh_releases_key() {
        let (cache, clock) = setup();
        cache.set_with_policy("global:alpha", &1u64, &public_policy()).unwrap();
        clock.advance(Duration::seconds(4_000));

        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async {
                let exploded = true;
                if exploded {
                    panic!("source exploded");
                }
                Ok(2u64)
            })
            .await
            .unwrap();
        assert_eq!(served.origin, ServedFrom::Stale);
        settle(&cache).await;

        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async { Ok(3u64) })
            .await
            .unwrap();
        assert_eq!(served.value, 1);
        settle(&cache).await;

        let lookup = cache.get("global:alpha").unwrap().unwrap();
        assert_eq!(lookup.state, EntryState::Fresh);
        assert_eq!(lookup.entry.decode::<u64>().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_expired_with_failing_source_propagates() {
        let (cache, clock) = setup();
        cache.set_with_policy("global:alpha", &1u64, &public_policy()).unwrap();
        clock.advance(Duration::seconds(7_200));

        let result = cache
            .get_or_fetch("global:alpha", &public_policy(), || async {
                Err::<u64, _>(PreviewError::source_unavailable("api", "down"))
            })
            .await;
        assert!(result.unwrap_err().is_source_failure());
    }

    #[tokio::test]
    async fn test_private_entry_is_never_served_stale() {
        let (cache, clock) = setup();
        let private = FreshnessPolicy {
            fresh_seconds: 3_600,
            stale_seconds: 3_600,
            is_public: false,
        };
        cache.set_with_policy("user:alpha:w1", &1u64, &private).unwrap();
        clock.advance(Duration::seconds(3_600));

        let served = cache
            .get_or_fetch("user:alpha:w1", &private, || async { Ok(5u64) })
            .await
            .unwrap();
        assert_eq!(served.origin, ServedFrom::Origin);
        assert_eq!(served.value, 5);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_refetched() {
        let (cache, _clock) = setup();
        cache.set_with_policy("global:alpha", &"text", &public_policy()).unwrap();

        let served = cache
            .get_or_fetch("global:alpha", &public_policy(), || async { Ok(3u64) })
            .await
            .unwrap();
        assert_eq!(served.origin, ServedFrom::Origin);
        assert_eq!(served.value, 3);
    }

    #[test]
    fn test_purge_and_hit_rate() {
        let (cache, clock) = setup();
        cache.set("a", &1u64, 10, 10).unwrap();
        cache.set("b", &1u64, 100, 100).unwrap();
        clock.advance(Duration::seconds(50));

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 1);

        let metrics = CacheMetrics {
            fresh_hits: 2,
            stale_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert!((metrics.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheMetrics::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_disabled_durable_uses_memory() {
        let config = CacheConfig {
            durable_enabled: false,
            ..Default::default()
        };
        assert_eq!(DurableCache::from_config(&config).backend_name(), "memory");
    }

    #[test]
    fn test_enabled_durable_uses_sqlite() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CacheConfig {
            durable_enabled: true,
            database_path: dir.path().join("cache.db").to_string_lossy().to_string(),
            ..Default::default()
        };
        assert_eq!(DurableCache::from_config(&config).backend_name(), "sqlite");
    }
}
