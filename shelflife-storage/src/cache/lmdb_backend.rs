//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the persisted key-value
//! store. Everything lives in the single unnamed database; keys are UTF-8
//! strings stored as raw bytes.
//!
//! # Quota
//!
//! The environment's map size is the storage quota. A write that does not
//! fit fails with `MDB_MAP_FULL`, the transaction is aborted, and the error
//! surfaces as [`StorageError::QuotaExceeded`].

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use shelflife_core::StorageError;
use tracing::debug;

use super::traits::{CacheBackend, WriteOp};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The map is full.
    #[error("LMDB map full")]
    MapFull,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbCacheError {
    fn from_heed(err: heed::Error) -> Self {
        match err {
            heed::Error::Mdb(MdbError::MapFull) => Self::MapFull,
            other => Self::Transaction(other.to_string()),
        }
    }

    fn into_storage(self, key: &str) -> StorageError {
        match self {
            Self::MapFull => StorageError::QuotaExceeded {
                key: key.to_string(),
            },
            Self::EnvOpen(reason) | Self::DbOpen(reason) => StorageError::OpenFailed { reason },
            Self::Transaction(reason) => StorageError::WriteFailed {
                key: key.to_string(),
                reason,
            },
            Self::Io(e) => StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

/// Convert LmdbCacheError to StorageError when no key is involved.
impl From<LmdbCacheError> for StorageError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::MapFull => StorageError::QuotaExceeded {
                key: String::new(),
            },
            LmdbCacheError::EnvOpen(reason) | LmdbCacheError::DbOpen(reason) => {
                StorageError::OpenFailed { reason }
            }
            other => StorageError::OpenFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// LMDB-backed cache backend.
///
/// # Example
///
/// ```ignore
/// use shelflife_storage::cache::{CacheBackend, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/tmp/shelflife-cache", 64)?;
/// backend.put("products_etag", b"\"abc\"".to_vec()).await?;
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Map size in megabytes; the storage quota
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        Self::with_map_size(path, max_size_mb * 1024 * 1024)
    }

    /// Create a backend with an explicit map size in bytes.
    pub fn with_map_size<P: AsRef<Path>>(
        path: P,
        map_size_bytes: usize,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this process
        // and never through another handle.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_bytes)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn apply(&self, ops: &[WriteOp]) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::from_heed)?;

        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    self.db
                        .put(&mut wtxn, key.as_bytes(), value)
                        .map_err(LmdbCacheError::from_heed)?;
                }
                WriteOp::Delete { key } => {
                    self.db
                        .delete(&mut wtxn, key.as_bytes())
                        .map_err(LmdbCacheError::from_heed)?;
                }
            }
        }

        // Dropping an uncommitted txn aborts it, so an error above leaves the
        // previous contents in place.
        wtxn.commit().map_err(LmdbCacheError::from_heed)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let read_failed = |reason: String| StorageError::ReadFailed {
            key: key.to_string(),
            reason,
        };

        let rtxn = self.env.read_txn().map_err(|e| read_failed(e.to_string()))?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| read_failed(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let first_key = ops.first().map(|op| op.key().to_string()).unwrap_or_default();
        self.apply(&ops).map_err(|e| e.into_storage(&first_key))?;
        debug!(ops = ops.len(), "lmdb batch committed");
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let read_failed = |reason: String| StorageError::ReadFailed {
            key: prefix.to_string(),
            reason,
        };

        let rtxn = self.env.read_txn().map_err(|e| read_failed(e.to_string()))?;
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| read_failed(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => {
                    if key.starts_with(prefix.as_bytes()) {
                        if let Ok(key) = std::str::from_utf8(key) {
                            keys.push(key.to_string());
                        }
                    }
                }
                Err(_) => continue,
            }
        }

        Ok(keys)
    }
}
