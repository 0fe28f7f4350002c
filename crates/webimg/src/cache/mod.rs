//! # Cache System
//!
//! Two cache tiers, a fast in-memory one and a durable on-disk one, chained
//! fastest first. Reads fall through the chain and promote hits; writes go
//! through to every tier.

// Module declarations
mod chain;
pub mod providers;
mod types;

pub use chain::CacheChain;
pub use providers::{CacheTier, DiskCache, MemoryCache, NoopCache};
pub use types::{CacheConfig, DiskCacheConfig, DiskEntryMeta};
