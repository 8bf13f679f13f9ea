//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Rejected argument (zero capacity, missing key or value)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key not present in the cache
    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidArgument("capacity must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid argument: capacity must be positive");

        let err = CacheError::KeyNotFound("\"a\"".to_string());
        assert_eq!(err.to_string(), "Key not found: \"a\"");
    }
}
