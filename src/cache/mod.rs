//! Cache layer
//!
//! In-process TTL cache (moka) for hot public reads: listing pages keyed by
//! their filter, and the Instagram feed. Values are stored as JSON so one
//! cache can hold any serializable type.
//!
//! # Usage
//!
//! ```rust,ignore
//! use brokerage::cache::create_cache;
//! use brokerage::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("listings:list:{}", &listings).await?;
//! cache.delete_prefix("listings:").await;
//! ```

use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// In-memory cache using moka
#[derive(Clone)]
pub struct MemoryCache {
    cache: Cache<String, Arc<String>>,
    ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a value; entries that fail to deserialize are treated as misses
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.cache.invalidate(key).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        self.cache.insert(key.to_string(), Arc::new(json)).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Remove every entry whose key starts with `prefix`
    pub async fn delete_prefix(&self, prefix: &str) {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

/// Shared cache handle
pub type SharedCache = Arc<MemoryCache>;

/// Create the cache from configuration
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(MemoryCache::new(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds.max(1)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> MemoryCache {
        MemoryCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = test_cache();
        cache.set("key1", &vec![1, 2, 3]).await.unwrap();
        let value: Option<Vec<i32>> = cache.get("key1").await;
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_get_missing_and_wrong_type() {
        let cache = test_cache();
        assert_eq!(cache.get::<String>("missing").await, None);

        cache.set("num", &42).await.unwrap();
        assert_eq!(cache.get::<Vec<String>>("num").await, None);
        // The undecodable entry is evicted
        assert_eq!(cache.get::<i32>("num").await, None);
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_matching_keys() {
        let cache = test_cache();
        cache.set("listings:list:a", &1).await.unwrap();
        cache.set("listings:list:b", &2).await.unwrap();
        cache.set("instagram:feed:9", &3).await.unwrap();

        cache.delete_prefix("listings:").await;

        assert_eq!(cache.get::<i32>("listings:list:a").await, None);
        assert_eq!(cache.get::<i32>("listings:list:b").await, None);
        assert_eq!(cache.get::<i32>("instagram:feed:9").await, Some(3));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = test_cache();
        cache.set("a", &1).await.unwrap();
        cache.clear().await;
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::new(10, Duration::from_millis(20));
        cache.set("short", &"lived").await.unwrap();
        assert_eq!(cache.get::<String>("short").await.as_deref(), Some("lived"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get::<String>("short").await, None);
    }

    #[test]
    fn test_create_cache_from_config() {
        let cache = create_cache(&CacheConfig {
            ttl_seconds: 0,
            max_capacity: 5,
        });
        assert_eq!(cache.ttl(), Duration::from_secs(1));
    }
}
