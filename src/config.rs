//! Configuration Module
//!
//! Handles loading and validating cache configuration, either built in code or
//! read from environment variables.

use std::env;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// Both values are optional: an absent capacity means the cache is unbounded,
/// an absent default TTL means entries never expire unless a write says so.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub capacity: Option<usize>,
    /// TTL applied to writes that do not carry their own
    pub default_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Creates a configuration for a bounded cache without default TTL.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            default_ttl: None,
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: unbounded)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: none)
    ///
    /// Unparseable values are treated as unset.
    pub fn from_env() -> Self {
        Self {
            capacity: env::var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok()),
            default_ttl: env::var("CACHE_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
        }
    }

    // == Validate ==
    /// Rejects a zero capacity.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == Some(0) {
            return Err(CacheError::InvalidArgument(
                "capacity must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
