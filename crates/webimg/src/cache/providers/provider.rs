//! # Cache Tier
//!
//! This module defines the trait every cache tier implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::image::Image;
use crate::request::RequestKey;

/// A single level of the cache chain
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Lookup that completes without I/O. Tiers backed by storage return `None`.
    fn peek(&self, _key: &RequestKey) -> Option<Arc<Image>> {
        None
    }

    /// Get an entry from the tier, refreshing its recency
    async fn get(&self, key: &RequestKey) -> CacheResult<Option<Arc<Image>>>;

    /// Put an entry into the tier, evicting least recently used entries as needed
    async fn put(&self, key: &RequestKey, image: Arc<Image>) -> CacheResult<()>;

    /// Evict a single entry
    async fn remove(&self, key: &RequestKey) -> CacheResult<()>;

    /// Evict every entry
    async fn clear(&self) -> CacheResult<()>;
}
