use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EngineError;

use super::{CacheStats, decode, encode, namespaced};

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process cache backend. Entries never expire on their own — §4.7
/// relies on a periodic `cache_sweep` scheduler job calling `sweep()` to
/// remove anything past its (optional) TTL.
pub struct MemoryCache<V> {
    prefix: &'static str,
    entries: Mutex<HashMap<String, Entry>>,
    stats: Mutex<CacheStats>,
    _marker: PhantomData<V>,
}

impl<V> MemoryCache<V> {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            _marker: PhantomData,
        }
    }

    /// Removes entries whose TTL has elapsed. A no-TTL entry is never
    /// removed by this pass.
    pub fn sweep(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at.is_none_or(|exp| exp > now));
        let evicted = before - entries.len();
        if evicted > 0 {
            self.stats.lock().unwrap().evictions += evicted as u64;
        }
    }
}

#[async_trait]
impl<V> super::Cache<V> for MemoryCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<V> {
        let key = namespaced(self.prefix, key);
        let now = Utc::now();
        let mut stats = self.stats.lock().unwrap();
        let entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some(entry) if entry.expires_at.is_none_or(|exp| exp > now) => {
                stats.hits += 1;
                decode(&entry.bytes)
            }
            _ => {
                stats.misses += 1;
                Err(EngineError::CacheMiss.into())
            }
        }
    }

    async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> anyhow::Result<()> {
        let key = namespaced(self.prefix, key);
        let bytes = encode(value)?;
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        self.entries.lock().unwrap().insert(key, Entry { bytes, expires_at });
        self.stats.lock().unwrap().sets += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = namespaced(self.prefix, key);
        self.entries.lock().unwrap().remove(&key);
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }
}

impl<V: Send + Sync> super::Sweepable for MemoryCache<V> {
    fn sweep(&self) {
        MemoryCache::sweep(self)
    }

    fn stats_sync(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    fn clear_sync(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache: MemoryCache<String> = MemoryCache::new("test:");
        cache.set("a", &"value".to_string(), None).await.unwrap();
        let got = cache.get("a").await.unwrap();
        assert_eq!(got, "value");
        assert_eq!(cache.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn miss_is_reported_and_counted() {
        let cache: MemoryCache<String> = MemoryCache::new("test:");
        let err = cache.get("missing").await.unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let cache: MemoryCache<String> = MemoryCache::new("test:");
        cache.set("expires", &"v".to_string(), Some(Duration::from_secs(0))).await.unwrap();
        cache.set("forever", &"v".to_string(), None).await.unwrap();
        // TTL of 0 means `expires_at` is already in the past.
        cache.sweep();
        assert!(cache.get("expires").await.is_err());
        assert!(cache.get("forever").await.is_ok());
    }
}
