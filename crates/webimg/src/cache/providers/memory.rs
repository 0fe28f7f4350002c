//! # Memory Cache Provider
//!
//! This module provides the in-memory tier using Moka with a strict LRU
//! eviction policy and a byte-size weigher.

use std::sync::Arc;

use async_trait::async_trait;
use moka::policy::EvictionPolicy;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use super::CacheTier;
use crate::error::CacheResult;
use crate::image::Image;
use crate::request::RequestKey;

/// Memory tier holding decoded images
#[derive(Clone)]
pub struct MemoryCache {
    cache: MokaCache<RequestKey, Arc<Image>>,
    /// Maximum aggregate size estimate in bytes
    max_size: u64,
}

impl MemoryCache {
    /// Create a new memory cache bounded by `max_size_bytes`
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .weigher(|_k, v: &Arc<Image>| v.size_estimate().try_into().unwrap_or(u32::MAX))
            .max_capacity(max_size_bytes)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        debug!(max_size = max_size_bytes, "Memory cache created");

        Self {
            cache,
            max_size: max_size_bytes,
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Aggregate size estimate of the resident entries
    pub fn size_bytes(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.cache.contains_key(key)
    }
}

#[async_trait]
impl CacheTier for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn peek(&self, key: &RequestKey) -> Option<Arc<Image>> {
        self.cache.get(key)
    }

    async fn get(&self, key: &RequestKey) -> CacheResult<Option<Arc<Image>>> {
        Ok(self.peek(key))
    }

    async fn put(&self, key: &RequestKey, image: Arc<Image>) -> CacheResult<()> {
        let size = image.size_estimate();

        // A single entry larger than the whole budget would only evict everything else
        if size > self.max_size {
            debug!(
                key = %key,
                size,
                max_size = self.max_size,
                "Entry too large for memory cache, skipping"
            );
            return Ok(());
        }

        self.cache.insert(key.clone(), image);
        // Settle eviction now so the budget holds as soon as put returns
        self.cache.run_pending_tasks();
        Ok(())
    }

    async fn remove(&self, key: &RequestKey) -> CacheResult<()> {
        self.cache.invalidate(key);
        debug!(key = %key, "Removed entry from memory cache");
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        debug!("Memory cache cleared");
        Ok(())
    }
}
