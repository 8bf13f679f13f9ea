//! Cache Module
//!
//! Provides an in-memory cache with LRU eviction and per-entry TTL expiration.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{Entry, Expiration};
pub use lru::{EntryHandle, Iter, OrderedStore};
pub use stats::CacheStats;
pub use store::{Cache, CacheBuilder, Source, Values};
