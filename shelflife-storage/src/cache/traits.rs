//! Cache backend trait.
//!
//! Backends store opaque byte values under string keys. All mutations go
//! through [`CacheBackend::write_batch`] so that an entry and its ETag token
//! are replaced together or not at all.

use async_trait::async_trait;
use shelflife_core::StorageError;

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Key-value backend for the cache store.
///
/// Implementations must apply a batch atomically and report a full store as
/// [`StorageError::QuotaExceeded`], leaving previous contents intact.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply every operation in one transaction.
    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError>;

    /// List keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Store a single value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.write_batch(vec![WriteOp::put(key, value)]).await
    }

    /// Remove a single key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.write_batch(vec![WriteOp::delete(key)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_op_key() {
        assert_eq!(WriteOp::put("a", vec![1]).key(), "a");
        assert_eq!(WriteOp::delete("b").key(), "b");
    }
}
