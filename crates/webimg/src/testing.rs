//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, Semaphore};

use crate::cache::CacheTier;
use crate::codec::ImageCodec;
use crate::error::{CacheResult, CodecError, FetchError};
use crate::fetcher::{ContentFetcher, FetchResponse};
use crate::image::Image;
use crate::request::RequestKey;

#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// In-memory fetcher that counts opens and can hold them behind a gate.
pub struct MockFetcher {
    resources: HashMap<String, Bytes>,
    opens: AtomicUsize,
    chunk_size: usize,
    report_length: bool,
    gate: Option<Arc<Semaphore>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            opens: AtomicUsize::new(0),
            chunk_size: 4,
            report_length: true,
            gate: None,
        }
    }

    pub fn with_resource(mut self, source: &str, data: impl Into<Bytes>) -> Self {
        self.resources.insert(source.to_string(), data.into());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Omit the content length from responses.
    pub fn without_length(mut self) -> Self {
        self.report_length = false;
        self
    }

    /// Every `open` waits for one permit released through [`release`](Self::release).
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn open(&self, source: &str) -> Result<FetchResponse, FetchError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| FetchError::NotFound("gate closed".to_string()))?
                .forget();
        }

        let data = self
            .resources
            .get(source)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(source.to_string()))?;

        let length = data.len() as u64;
        let chunks: Vec<Result<Bytes, FetchError>> = data
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(FetchResponse::new(
            Box::pin(futures::stream::iter(chunks)),
            self.report_length.then_some(length),
        ))
    }
}

/// Codec treating raw bytes as a `len x 1` image. Payloads starting with
/// `corrupt` fail to decode.
#[derive(Default)]
pub struct MockCodec {
    decodes: AtomicUsize,
}

impl MockCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ImageCodec for MockCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Image, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if bytes.starts_with(b"corrupt") {
            return Err(CodecError::Malformed("corrupt payload".to_string()));
        }
        Ok(Image::new(bytes.len() as u32, 1, bytes.to_vec()))
    }

    fn encode(&self, image: &Image) -> Result<Vec<u8>, CodecError> {
        Ok(image.pixels().to_vec())
    }
}

/// Cache tier whose `put` holds until [`release`](Self::release) is called.
pub struct GatedTier {
    started: Notify,
    gate: Semaphore,
    entries: parking_lot::Mutex<HashMap<RequestKey, Arc<Image>>>,
}

impl GatedTier {
    pub fn new() -> Self {
        Self {
            started: Notify::new(),
            gate: Semaphore::new(0),
            entries: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Resolves once a `put` is waiting at the gate.
    pub async fn wait_for_put(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl CacheTier for GatedTier {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn peek(&self, key: &RequestKey) -> Option<Arc<Image>> {
        self.entries.lock().get(key).cloned()
    }

    async fn get(&self, key: &RequestKey) -> CacheResult<Option<Arc<Image>>> {
        Ok(self.peek(key))
    }

    async fn put(&self, key: &RequestKey, image: Arc<Image>) -> CacheResult<()> {
        self.started.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.entries.lock().insert(key.clone(), image);
        Ok(())
    }

    async fn remove(&self, key: &RequestKey) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
