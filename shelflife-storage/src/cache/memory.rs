//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use shelflife_core::StorageError;

use super::traits::{CacheBackend, WriteOp};

/// Map-backed cache backend with an optional byte quota.
///
/// The quota counts key and value bytes of everything stored. A batch that
/// would exceed it is rejected whole.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Total bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|entries| footprint(&entries))
            .unwrap_or(0)
    }
}

fn footprint(entries: &HashMap<String, Vec<u8>>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;

        let mut staged = entries.clone();
        for op in &ops {
            match op {
                WriteOp::Put { key, value } => {
                    staged.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key } => {
                    staged.remove(key);
                }
            }
        }

        if let Some(quota) = self.quota_bytes {
            if footprint(&staged) > quota {
                let key = ops.first().map(|op| op.key().to_string()).unwrap_or_default();
                return Err(StorageError::QuotaExceeded { key });
            }
        }

        *entries = staged;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
