use std::path::PathBuf;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use super::{ContentFetcher, FetchResponse};
use crate::error::FetchError;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads `file://` URLs and bare filesystem paths.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    chunk_size: usize,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn resolve(source: &str) -> Result<PathBuf, FetchError> {
        if source.starts_with("file:") {
            let url =
                Url::parse(source).map_err(|e| FetchError::InvalidSource(format!("{source}: {e}")))?;
            return url
                .to_file_path()
                .map_err(|_| FetchError::InvalidSource(source.to_string()));
        }
        Ok(PathBuf::from(source))
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for FileFetcher {
    async fn open(&self, source: &str) -> Result<FetchResponse, FetchError> {
        let path = Self::resolve(source)?;
        let file = File::open(&path).await?;
        let length = file.metadata().await?.len();
        debug!(path = ?path, length, "Opened file source");

        let stream = ReaderStream::with_capacity(file, self.chunk_size).map_err(FetchError::from);
        Ok(FetchResponse::new(Box::pin(stream), Some(length)))
    }
}
