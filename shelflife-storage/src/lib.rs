//! Shelflife Storage - Cache Store
//!
//! Persists the last processed product dataset together with its freshness
//! timestamp, ETag, schema version and checksum. Reads fail closed: an entry
//! that cannot be trusted is deleted and reported as absent.

pub mod cache;

pub use cache::{
    verify_entry, CacheBackend, CacheStore, LmdbCacheBackend, LmdbCacheError, MemoryCacheBackend,
    WriteOp,
};
