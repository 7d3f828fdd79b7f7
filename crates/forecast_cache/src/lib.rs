//! On-disk cache of downloaded forecast files.
//!
//! One [`CacheManager`] is built at startup and shared (`Arc`) by every
//! loader. It names files deterministically from (source, cycle, forecast
//! hour), keeps a JSON metadata index next to them, and enforces expiry and
//! an LRU size budget.

pub mod entry;
pub mod manager;

pub use entry::{CacheEntry, CacheStats, SourceKind};
pub use manager::CacheManager;

/// Name of the persisted metadata index inside the cache directory.
pub const METADATA_FILE: &str = "cache_metadata.json";
