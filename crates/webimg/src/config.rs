use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DiskCacheConfig};

/// Configurable options for the loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Byte budget of the memory tier; zero disables it
    pub memory_cache_size: u64,

    /// Disk tier settings (optional)
    pub disk_cache: Option<DiskCacheConfig>,

    /// Maximum number of pipeline jobs running at once
    pub worker_count: usize,

    /// Chunk size for reading local files
    pub read_chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: CacheConfig::default().memory_cache_size,
            disk_cache: None,
            worker_count: 4,
            read_chunk_size: 64 * 1024, // 64KB
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> crate::builder::LoaderBuilder {
        crate::builder::LoaderBuilder::new()
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            memory_cache_size: self.memory_cache_size,
            disk: self.disk_cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.memory_cache_size, 30 * 1024 * 1024);
        assert!(config.disk_cache.is_none());
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.read_chunk_size, 64 * 1024);
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: LoaderConfig = serde_json::from_str(
            r#"{
                "memory_cache_size": 1024,
                "disk_cache": { "path": "/tmp/webimg", "max_size": 4096 },
                "worker_count": 2,
                "read_chunk_size": 512
            }"#,
        )
        .unwrap();

        let cache = config.cache_config();
        assert_eq!(cache.memory_cache_size, 1024);
        assert_eq!(cache.disk.unwrap().max_size, 4096);
        assert_eq!(config.worker_count, 2);
    }
}
