//! # Cache Providers
//!
//! This module contains the cache tier implementations.

pub use self::disk::DiskCache;
pub use self::memory::MemoryCache;
pub use self::noop::NoopCache;
pub use self::provider::CacheTier;

// Tier interface
pub mod provider;

// Individual tier implementations
pub mod disk;
pub mod memory;
pub mod noop;
