//! # Cache Types
//!
//! Configuration and persisted metadata shared by the cache tiers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the cache chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget of the memory tier; zero disables the tier
    pub memory_cache_size: u64,
    /// Disk tier settings; `None` disables the tier
    pub disk: Option<DiskCacheConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: 30 * 1024 * 1024, // 30MB
            disk: None,
        }
    }
}

/// Configuration for the persistent disk tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Directory holding entries; created on open
    pub path: PathBuf,
    /// Maximum total size of stored entries in bytes
    pub max_size: u64,
}

impl DiskCacheConfig {
    pub fn new(path: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            path: path.into(),
            max_size,
        }
    }
}

/// Sidecar metadata persisted next to every disk entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskEntryMeta {
    /// Source identifier of the cached request
    pub source: String,
    /// Transformation identifier of the cached request, if any
    pub transformation: Option<String>,
    /// Size of the encoded entry in bytes
    pub size: u64,
    /// Last access stamp in milliseconds since the Unix epoch
    pub last_accessed: u64,
}
