//! Background Tasks Module
//!
//! Contains the machinery that runs alongside the cache.
//!
//! # Tasks
//! - TTL Cleanup: evicts entries when their deadline is reached

mod cleanup;

pub use cleanup::{CleanupCoordinator, ExpirySink};
