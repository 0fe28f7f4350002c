//! # Content fetchers
//!
//! A fetcher opens a source identifier and yields a byte stream plus the total
//! length when the source knows it. The loader is agnostic to where bytes come
//! from; [`SchemeRouter`] picks a fetcher by URL scheme.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::FetchError;

mod file;
mod http;
mod router;

pub use file::FileFetcher;
pub use http::HttpFetcher;
pub use router::SchemeRouter;

/// Chunked body of an opened source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// An opened source.
pub struct FetchResponse {
    pub stream: ByteStream,
    /// Total length in bytes, if known up front.
    pub content_length: Option<u64>,
}

impl FetchResponse {
    pub fn new(stream: ByteStream, content_length: Option<u64>) -> Self {
        Self {
            stream,
            content_length,
        }
    }
}

/// Byte source capability.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn open(&self, source: &str) -> Result<FetchResponse, FetchError>;
}
