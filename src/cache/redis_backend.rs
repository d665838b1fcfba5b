use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EngineError;

use super::{CacheStats, decode, encode, namespaced};

/// Remote KV cache backend. Unlike `MemoryCache`, TTLs are honored natively
/// by Redis (`SET key value EX seconds`), so there is no sweep job for this
/// backend.
pub struct RedisCache<V> {
    prefix: &'static str,
    client: redis::Client,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    _marker: PhantomData<V>,
}

impl<V> RedisCache<V> {
    pub fn new(redis_url: &str, prefix: &'static str) -> anyhow::Result<Self> {
        Ok(Self {
            prefix,
            client: redis::Client::open(redis_url)?,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<V> super::Cache<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<V> {
        let key = namespaced(self.prefix, key);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(&key).await?;
        match bytes {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                decode(&bytes)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(EngineError::CacheMiss.into())
            }
        }
    }

    async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> anyhow::Result<()> {
        let key = namespaced(self.prefix, key);
        let bytes = encode(value)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(&key, bytes, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(&key, bytes).await?;
            }
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = namespaced(self.prefix, key);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let pattern = format!("{}*", self.prefix);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = conn.keys(&pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: 0,
        }
    }
}
