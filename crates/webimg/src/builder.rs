//! # Builder for Loader
//!
//! Fluent configuration of a [`Loader`]: cache budgets, worker count and the
//! fetch and decode capabilities.
//!
//! # Example
//!
//! ```no_run
//! use webimg_engine::LoaderBuilder;
//!
//! # async fn run() -> Result<(), webimg_engine::BuildError> {
//! let loader = LoaderBuilder::new()
//!     .with_memory_cache_size(16 * 1024 * 1024)
//!     .with_disk_cache("/tmp/webimg", 256 * 1024 * 1024)
//!     .with_worker_count(8)
//!     .build()
//!     .await?;
//! # drop(loader);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::cache::{CacheChain, DiskCacheConfig};
use crate::codec::{ImageCodec, RasterCodec};
use crate::config::LoaderConfig;
use crate::error::BuildError;
use crate::fetcher::{ContentFetcher, SchemeRouter};
use crate::loader::Loader;

/// Builder for creating Loader instances with a fluent API
pub struct LoaderBuilder {
    config: LoaderConfig,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    scheme_handlers: Vec<(String, Arc<dyn ContentFetcher>)>,
    codec: Arc<dyn ImageCodec>,
}

impl LoaderBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
            fetcher: None,
            scheme_handlers: Vec::new(),
            codec: Arc::new(RasterCodec),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the memory tier budget in bytes; zero disables the tier
    pub fn with_memory_cache_size(mut self, bytes: u64) -> Self {
        self.config.memory_cache_size = bytes;
        self
    }

    /// Enable the disk tier in `path` with a budget of `max_size` bytes
    pub fn with_disk_cache(mut self, path: impl Into<PathBuf>, max_size: u64) -> Self {
        self.config.disk_cache = Some(DiskCacheConfig::new(path, max_size));
        self
    }

    pub fn without_disk_cache(mut self) -> Self {
        self.config.disk_cache = None;
        self
    }

    /// Set the maximum number of concurrent pipeline jobs
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.config.worker_count = workers.max(1);
        self
    }

    /// Set the chunk size used when reading local files
    pub fn with_read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes.max(1);
        self
    }

    /// Use `fetcher` for every source, bypassing scheme routing and any
    /// handlers registered with [`with_scheme_handler`](Self::with_scheme_handler)
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Route sources with the given URL scheme to `fetcher`
    pub fn with_scheme_handler(
        mut self,
        scheme: impl Into<String>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        self.scheme_handlers.push((scheme.into(), fetcher));
        self
    }

    /// Set the codec used for decoding fetched bytes and disk entries
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Open the cache tiers and start the worker pool on the current runtime
    pub async fn build(self) -> Result<Loader, BuildError> {
        let handle = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let mut router = SchemeRouter::with_defaults(self.config.read_chunk_size)?;
                for (scheme, handler) in self.scheme_handlers {
                    router.register(&scheme, handler);
                }
                Arc::new(router)
            }
        };

        let chain = CacheChain::open(&self.config.cache_config(), self.codec.clone()).await;

        Ok(Loader::start(
            handle,
            chain,
            fetcher,
            self.codec,
            self.config.worker_count,
        ))
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
