//! Durable key-value cache for previously fetched remote data.
//!
//! Values are stored as JSON with an optional expiry. A read that finds an
//! expired entry behaves as a miss and evicts the entry from storage.

mod data_cache;
mod entry;

pub use data_cache::DataCache;
pub use entry::CacheEntry;
