//! # Webimg
//!
//! An image loading engine: fetches image bytes from arbitrary sources,
//! decodes and optionally transforms them, and keeps the results in a
//! two-tier cache.
//!
//! ## Features
//!
//! - Concurrent requests for the same image coalesced into one fetch
//! - Tag-based rebinding and cancellation of in-flight loads
//! - Memory (LRU, byte budget) and disk (persistent, byte budget) cache tiers
//! - Progress reporting while bytes arrive
//! - Pluggable fetchers per URL scheme and pluggable codecs
//!
//! ## Example
//!
//! ```no_run
//! use webimg_engine::{LoaderBuilder, Request, Tag, listener};
//!
//! # async fn run() -> Result<(), webimg_engine::BuildError> {
//! let loader = LoaderBuilder::new().build().await?;
//!
//! let hit = loader.load(
//!     Some(Tag::from("avatar")),
//!     Request::new("https://example.com/a.png"),
//!     listener(|tag, result| match result {
//!         Ok(image) => println!("{tag:?}: {}x{}", image.width(), image.height()),
//!         Err(e) => eprintln!("{tag:?}: {e}"),
//!     }),
//!     None,
//! );
//! assert!(hit.is_none());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod image;
pub mod listener;
pub mod loader;
pub mod request;

mod pipeline;
mod registry;

#[cfg(test)]
mod testing;

pub use builder::LoaderBuilder;
pub use cache::{CacheChain, CacheConfig, CacheTier, DiskCacheConfig};
pub use codec::{ImageCodec, RasterCodec};
pub use config::LoaderConfig;
pub use error::{BuildError, CacheError, CodecError, FetchError, LoadError};
pub use fetcher::{ContentFetcher, FetchResponse, FileFetcher, HttpFetcher, SchemeRouter};
pub use image::{FnTransformation, Image, Transformation};
pub use listener::{FnListener, Listener, NoopListener, OnProgress, listener};
pub use loader::{Loader, LoaderStats};
pub use request::{Request, RequestFlags, RequestKey, Tag};
