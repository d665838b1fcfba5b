mod memory;
mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;
pub use memory::MemoryCache;
pub use redis_backend::RedisCache;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EngineError;

/// Cumulative counters for one cache instance, exposed over
/// `/admin/api/scheduler/cache/stats`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

/// A typed, prefix-namespaced cache over either an in-process map or a
/// remote KV store. `V` is JSON-encoded on the way in and out so either
/// backend only ever has to move bytes.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<V>;
    async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
    async fn stats(&self) -> CacheStats;
}

/// Implemented only by the in-memory backend; lets the engine register a
/// periodic sweep job and report aggregate stats without needing to know
/// each cache's value type.
pub trait Sweepable: Send + Sync {
    fn sweep(&self);
    fn stats_sync(&self) -> CacheStats;
    fn clear_sync(&self);
}

pub(crate) fn namespaced(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

pub(crate) fn encode<V: Serialize>(value: &V) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<V> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::ValidationFailed(e.to_string()).into())
}

/// Key prefixes for each cached domain, kept together so a renamed prefix
/// only needs to change in one place.
pub mod prefixes {
    pub const SERIES_ITEMS: &str = "series:items:";
    pub const SERIES_TAGS: &str = "series:tags:";
    pub const MOVIE_ITEMS: &str = "movie:items:";
    pub const MOVIE_TAGS: &str = "movie:tags:";
    pub const JELLYFIN_ITEMS: &str = "jellyfin:items:";
    pub const LIBRARY_FOLDERS: &str = "jellyfin:libraries:";
}
