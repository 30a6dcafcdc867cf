//! Shared infrastructure for Weft modules
//!
//! A generic async connection pool, an LRU cache with TTL, and a webhook
//! sender with retry and a dead-letter queue.

pub mod cache;
pub mod pool;
pub mod webhook;

pub use cache::*;
pub use pool::*;
pub use webhook::*;
