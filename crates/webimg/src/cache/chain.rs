//! # Cache Chain
//!
//! This module provides the ordered list of tiers (fastest first) with a
//! unified get/put that honours per-request flags.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::providers::{CacheTier, DiskCache, MemoryCache, NoopCache};
use crate::cache::types::CacheConfig;
use crate::codec::ImageCodec;
use crate::image::Image;
use crate::request::{RequestFlags, RequestKey};

/// Read-through, write-through cache over a fixed list of tiers
#[derive(Clone)]
pub struct CacheChain {
    tiers: Vec<Arc<dyn CacheTier>>,
}

impl CacheChain {
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self { tiers }
    }

    /// Build the chain described by `config`.
    ///
    /// Never fails: a disk tier that cannot be opened is replaced by a no-op
    /// tier and the chain carries on with the memory tier alone.
    pub async fn open(config: &CacheConfig, codec: Arc<dyn ImageCodec>) -> Self {
        let mut tiers: Vec<Arc<dyn CacheTier>> = Vec::new();

        if config.memory_cache_size > 0 {
            tiers.push(Arc::new(MemoryCache::new(config.memory_cache_size)));
        }

        if let Some(disk_config) = &config.disk {
            match DiskCache::open(disk_config, codec).await {
                Ok(disk) => tiers.push(Arc::new(disk)),
                Err(e) => {
                    warn!(
                        path = ?disk_config.path,
                        error = %e,
                        "Disk cache unavailable, continuing without it"
                    );
                    tiers.push(Arc::new(NoopCache));
                }
            }
        }

        Self::new(tiers)
    }

    /// Names of the configured tiers, fastest first
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Immediate lookup that touches no storage
    pub fn peek(&self, key: &RequestKey, flags: RequestFlags) -> Option<Arc<Image>> {
        if flags.contains(RequestFlags::IGNORE_CACHE) {
            return None;
        }
        self.tiers.iter().find_map(|tier| tier.peek(key))
    }

    /// Probe every tier in order; a hit in a slower tier is promoted into
    /// all faster ones
    pub async fn get(&self, key: &RequestKey, flags: RequestFlags) -> Option<Arc<Image>> {
        if flags.contains(RequestFlags::IGNORE_CACHE) {
            return None;
        }

        for (level, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(image)) => {
                    debug!(key = %key, tier = tier.name(), "Cache hit");
                    for faster in &self.tiers[..level] {
                        if let Err(e) = faster.put(key, image.clone()).await {
                            warn!(key = %key, tier = faster.name(), error = %e, "Cache promotion failed");
                        }
                    }
                    return Some(image);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, tier = tier.name(), error = %e, "Cache read failed");
                }
            }
        }
        None
    }

    /// Write the entry to every tier unless `NO_CACHE` is set
    pub async fn put(&self, key: &RequestKey, image: Arc<Image>, flags: RequestFlags) {
        if flags.contains(RequestFlags::NO_CACHE) {
            debug!(key = %key, "Skipping cache write for NO_CACHE request");
            return;
        }

        for tier in &self.tiers {
            if let Err(e) = tier.put(key, image.clone()).await {
                warn!(key = %key, tier = tier.name(), error = %e, "Cache write failed");
            }
        }
    }

    /// Write-through that gives up once `cancel` fires. Tiers already
    /// written are rolled back, so a cancelled operation leaves no entry.
    ///
    /// Returns false when the write was abandoned.
    pub async fn put_unless_cancelled(
        &self,
        key: &RequestKey,
        image: Arc<Image>,
        flags: RequestFlags,
        cancel: &CancellationToken,
    ) -> bool {
        if flags.contains(RequestFlags::NO_CACHE) {
            debug!(key = %key, "Skipping cache write for NO_CACHE request");
            return !cancel.is_cancelled();
        }

        for (written, tier) in self.tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                self.roll_back(key, written).await;
                return false;
            }
            if let Err(e) = tier.put(key, image.clone()).await {
                warn!(key = %key, tier = tier.name(), error = %e, "Cache write failed");
            }
        }

        if cancel.is_cancelled() {
            self.roll_back(key, self.tiers.len()).await;
            return false;
        }
        true
    }

    async fn roll_back(&self, key: &RequestKey, written: usize) {
        debug!(key = %key, tiers = written, "Rolling back cancelled cache write");
        for tier in &self.tiers[..written] {
            if let Err(e) = tier.remove(key).await {
                warn!(key = %key, tier = tier.name(), error = %e, "Cache rollback failed");
            }
        }
    }

    /// Remove a key from every tier
    pub async fn remove(&self, key: &RequestKey) {
        for tier in &self.tiers {
            if let Err(e) = tier.remove(key).await {
                warn!(key = %key, tier = tier.name(), error = %e, "Cache removal failed");
            }
        }
    }

    /// Clear every tier
    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                warn!(tier = tier.name(), error = %e, "Cache clear failed");
            }
        }
    }
}
