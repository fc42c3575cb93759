//! Cache layer over a pluggable key-value backend.
//!
//! [`CacheStore`] owns the entry format and its integrity rules; backends
//! only move bytes. Two backends ship here:
//!
//! - [`LmdbCacheBackend`]: LMDB via heed, the persisted store.
//! - [`MemoryCacheBackend`]: a map with an optional byte quota, for tests
//!   and for embedding without a filesystem.
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(LmdbCacheBackend::new("/tmp/shelflife", 64)?);
//! let store = CacheStore::new(backend);
//!
//! store.save(&records, Some("\"v1\"")).await;
//! if let Some(entry) = store.load().await {
//!     // checksum and schema version already verified
//! }
//! ```

pub mod lmdb_backend;
pub mod memory;
pub mod store;
pub mod traits;

pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::MemoryCacheBackend;
pub use store::{verify_entry, CacheStore};
pub use traits::{CacheBackend, WriteOp};
