pub mod cleanup;
pub mod decider;
pub mod disk_usage;
pub mod filters;
pub mod inventory;
pub mod keep_requests;
pub mod tags;

use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::adapters::{ArrClient, JellyfinClient, RadarrClient, RequestManagerClient, SonarrClient, StatsClient};
use crate::cache::{Cache, MemoryCache, RedisCache, Sweepable};
use crate::config::{CacheBackendKind, Config};
use crate::image_cache::ImageCache;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::store::MediaStore;

/// Wires every collaborator the engine needs together behind `Arc`s so it can
/// be cloned cheaply into scheduler job closures and HTTP handler state
/// (§5 "Shared resources").
pub struct Engine {
    pub config: Arc<Config>,
    pub jellyfin: Arc<JellyfinClient>,
    pub sonarr: Arc<SonarrClient>,
    pub radarr: Arc<RadarrClient>,
    pub stats: Arc<StatsClient>,
    pub request_manager: Arc<RequestManagerClient>,
    pub store: Arc<dyn MediaStore>,
    pub notifier: Arc<Notifier>,
    pub image_cache: Arc<ImageCache>,
    pub scheduler: Arc<Scheduler>,
    memory_caches: Mutex<Vec<Arc<dyn Sweepable>>>,
}

impl Engine {
    pub async fn new(config: Config, store: Arc<dyn MediaStore>, notifier: Notifier) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let jellyfin = JellyfinClient::new(&config.jellyfin)?;
        let sonarr = Arc::new(SonarrClient::new(&config.sonarr)?);
        let radarr = Arc::new(RadarrClient::new(&config.radarr)?);
        let stats = Arc::new(StatsClient::new(&config.stats)?);
        let request_manager = Arc::new(RequestManagerClient::new(&config.request_manager)?);
        let image_cache = Arc::new(ImageCache::new("./data/cache/images"));
        let scheduler = Arc::new(Scheduler::new().await?);

        Ok(Self {
            config,
            jellyfin,
            sonarr,
            radarr,
            stats,
            request_manager,
            store,
            notifier: Arc::new(notifier),
            image_cache,
            scheduler,
            memory_caches: Mutex::new(Vec::new()),
        })
    }

    /// Constructs a typed cache over whichever backend `cache_backend`
    /// selects (§4.7 "Open Question"), namespaced by `prefix`. Memory-backed
    /// instances are also registered for the periodic `cache_sweep` job.
    pub fn cache<V>(&self, prefix: &'static str) -> Box<dyn Cache<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match self.config.cache_backend {
            CacheBackendKind::Memory => {
                let cache = Arc::new(MemoryCache::<V>::new(prefix));
                self.memory_caches.lock().unwrap().push(cache.clone());
                Box::new(ArcCache(cache))
            }
            CacheBackendKind::Redis => {
                let url = self.config.redis_url.as_deref().unwrap_or("redis://127.0.0.1");
                match RedisCache::<V>::new(url, prefix) {
                    Ok(cache) => Box::new(cache),
                    Err(e) => {
                        warn!("failed to build redis cache, falling back to memory: {e:#}");
                        let cache = Arc::new(MemoryCache::<V>::new(prefix));
                        self.memory_caches.lock().unwrap().push(cache.clone());
                        Box::new(ArcCache(cache))
                    }
                }
            }
        }
    }

    async fn run_cleanup(&self, dry_run: bool) -> anyhow::Result<cleanup::CleanupOutcome> {
        cleanup::run(
            &self.config,
            &self.jellyfin,
            self.sonarr.as_ref(),
            self.radarr.as_ref(),
            &self.stats,
            &self.request_manager,
            self.store.as_ref(),
            &self.notifier,
            dry_run,
        )
        .await
    }

    pub async fn run_cleanup_once(&self, dry_run: bool) -> anyhow::Result<cleanup::CleanupOutcome> {
        self.run_cleanup(dry_run).await
    }

    /// Registers the `cleanup`, `clear_image_cache`, `tag_gc` and
    /// (memory-backend-only) `cache_sweep` jobs and starts the scheduler
    /// (§2.2, §4.1).
    pub async fn start_scheduler(self: &Arc<Self>) -> anyhow::Result<()> {
        let engine = self.clone();
        let dry_run = self.config.dry_run;
        self.scheduler
            .add_singleton_job(
                "cleanup",
                "Cleanup",
                "Marks and deletes media items that have aged out of their libraries",
                &self.config.cleanup_schedule,
                true,
                move || {
                    let engine = engine.clone();
                    async move {
                        if let Err(e) = engine.run_cleanup(dry_run).await {
                            warn!("cleanup job failed: {e:#}");
                        }
                    }
                },
            )
            .await?;

        let engine = self.clone();
        self.scheduler
            .add_singleton_job(
                "clear_image_cache",
                "Clear image cache",
                "Purges cached poster images older than 7 days",
                "0 0 4 * * Sun",
                true,
                move || {
                    let engine = engine.clone();
                    async move {
                        if let Err(e) = engine.image_cache.purge_stale().await {
                            warn!("image cache purge failed: {e:#}");
                        }
                    }
                },
            )
            .await?;

        let engine = self.clone();
        self.scheduler
            .add_singleton_job(
                "tag_gc",
                "Tag garbage collection",
                "Removes jellysweep-* arr tags with zero associated items",
                "0 30 4 * * Sun",
                true,
                move || {
                    let engine = engine.clone();
                    async move {
                        if let Err(e) = engine.collect_tag_garbage().await {
                            warn!("tag garbage collection failed: {e:#}");
                        }
                    }
                },
            )
            .await?;

        if self.config.cache_backend == CacheBackendKind::Memory {
            let engine = self.clone();
            self.scheduler
                .add_singleton_job(
                    "cache_sweep",
                    "Cache sweep",
                    "Evicts expired entries from the in-memory cache backend",
                    "0 */10 * * * *",
                    false,
                    move || {
                        let engine = engine.clone();
                        async move {
                            let caches = engine.memory_caches.lock().unwrap();
                            for cache in caches.iter() {
                                cache.sweep();
                            }
                        }
                    },
                )
                .await?;
        }

        self.scheduler.start().await
    }

    /// Aggregate stats across every memory-backed cache registered so far,
    /// exposed over `/admin/api/scheduler/cache/stats`. Empty (and
    /// meaningless) for the Redis backend, which keeps no local registry.
    pub fn cache_stats(&self) -> Vec<crate::cache::CacheStats> {
        self.memory_caches.lock().unwrap().iter().map(|c| c.stats_sync()).collect()
    }

    pub fn clear_caches(&self) {
        for cache in self.memory_caches.lock().unwrap().iter() {
            cache.clear_sync();
        }
    }

    async fn collect_tag_garbage(&self) -> anyhow::Result<()> {
        let inventory::Inventory { by_library, .. } =
            inventory::fetch_inventory(&self.jellyfin, self.sonarr.as_ref(), self.radarr.as_ref(), &self.config).await?;

        let sonarr_label_sets: Vec<Vec<String>> = by_library
            .values()
            .flatten()
            .filter(|item| matches!(item.media_ref, crate::domain::MediaRef::Series(_)))
            .map(|item| item.tags.clone())
            .collect();
        let radarr_label_sets: Vec<Vec<String>> = by_library
            .values()
            .flatten()
            .filter(|item| matches!(item.media_ref, crate::domain::MediaRef::Movie(_)))
            .map(|item| item.tags.clone())
            .collect();

        let removed_sonarr = tags::garbage_collect_tags(self.sonarr.as_ref(), &sonarr_label_sets).await?;
        let removed_radarr = tags::garbage_collect_tags(self.radarr.as_ref(), &radarr_label_sets).await?;
        info!("tag gc removed {removed_sonarr} sonarr tag(s), {removed_radarr} radarr tag(s)");
        Ok(())
    }
}

/// Delegates to a shared `MemoryCache`, letting the engine hold its own
/// `Arc` for the periodic sweep job while the caller still owns a `Box<dyn
/// Cache<V>>`.
struct ArcCache<V>(Arc<MemoryCache<V>>);

#[async_trait::async_trait]
impl<V> Cache<V> for ArcCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<V> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &V, ttl: Option<std::time::Duration>) -> anyhow::Result<()> {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.0.delete(key).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.0.clear().await
    }

    async fn stats(&self) -> crate::cache::CacheStats {
        self.0.stats().await
    }
}
