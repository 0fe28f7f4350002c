use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;
use url::Url;

use super::{ContentFetcher, FetchResponse, FileFetcher, HttpFetcher};
use crate::error::FetchError;

/// Dispatches `open` to a fetcher registered for the source's URL scheme.
///
/// Sources without a scheme (plain paths) go to the fallback fetcher, if any.
#[derive(Clone, Default)]
pub struct SchemeRouter {
    handlers: HashMap<String, Arc<dyn ContentFetcher>>,
    fallback: Option<Arc<dyn ContentFetcher>>,
}

impl SchemeRouter {
    /// An empty router: every source is rejected until handlers are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// `http`, `https` and `file` handlers, with plain paths read from disk
    /// in chunks of `read_chunk_size` bytes.
    pub fn with_defaults(read_chunk_size: usize) -> Result<Self, FetchError> {
        let http: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::new()?);
        let file: Arc<dyn ContentFetcher> =
            Arc::new(FileFetcher::new().with_chunk_size(read_chunk_size));
        Ok(Self::new()
            .with_handler("http", http.clone())
            .with_handler("https", http)
            .with_handler("file", file.clone())
            .with_fallback(file))
    }

    pub fn with_handler(mut self, scheme: &str, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.register(scheme, fetcher);
        self
    }

    pub fn with_fallback(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fallback = Some(fetcher);
        self
    }

    /// Register or replace the handler for a scheme (case-insensitive).
    pub fn register(&mut self, scheme: &str, fetcher: Arc<dyn ContentFetcher>) {
        self.handlers.insert(scheme.to_ascii_lowercase(), fetcher);
    }

    fn scheme_of(source: &str) -> Option<String> {
        match Url::parse(source) {
            // Single letter schemes are Windows drive letters, not URLs.
            Ok(url) if url.scheme().len() > 1 => Some(url.scheme().to_string()),
            _ => None,
        }
    }

    fn route(&self, source: &str) -> Result<&Arc<dyn ContentFetcher>, FetchError> {
        match Self::scheme_of(source) {
            Some(scheme) => self
                .handlers
                .get(&scheme)
                .ok_or(FetchError::UnsupportedScheme(scheme)),
            None => self
                .fallback
                .as_ref()
                .ok_or_else(|| FetchError::InvalidSource(source.to_string())),
        }
    }
}

#[async_trait]
impl ContentFetcher for SchemeRouter {
    async fn open(&self, source: &str) -> Result<FetchResponse, FetchError> {
        let fetcher = self.route(source)?;
        trace!(source, "Routing source to scheme handler");
        fetcher.open(source).await
    }
}
