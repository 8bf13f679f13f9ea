//! ttl_lru - An in-memory LRU cache with per-entry TTL expiration
//!
//! Entries are evicted least-recently-used first once the cache is full, and
//! entries written with a time-to-live are removed by a background thread when
//! their deadline passes.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheStats, Expiration, Source};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
