use std::sync::Arc;

use async_trait::async_trait;

use super::CacheTier;
use crate::error::CacheResult;
use crate::image::Image;
use crate::request::RequestKey;

/// Tier that stores nothing. Stands in for a disk tier that failed to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheTier for NoopCache {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn get(&self, _key: &RequestKey) -> CacheResult<Option<Arc<Image>>> {
        Ok(None)
    }

    async fn put(&self, _key: &RequestKey, _image: Arc<Image>) -> CacheResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &RequestKey) -> CacheResult<()> {
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        Ok(())
    }
}
