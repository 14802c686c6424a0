//! Response cache: canonical keys and a TTL store with single-flight fetches.

pub mod key;
pub mod store;

pub use key::{CacheKey, CacheKeyBuilder};
pub use store::{CacheEntry, CacheStats, CacheStore};
