//! Cache store: entry format, integrity checks and quota recovery.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shelflife_core::{
    checksum, CacheEntry, CorruptionError, ProductRecord, StorageError, Timestamp, CACHE_KEY,
    ETAG_KEY, FALLBACK_ETAG, SCHEMA_VERSION,
};
use tracing::{debug, info, warn};

use super::traits::{CacheBackend, WriteOp};

/// Persisted store for the last processed dataset.
///
/// The entry and its ETag token are written in one batch. Reads verify the
/// schema version and checksum; any entry that fails is deleted and reported
/// as absent, so callers never see untrusted data.
///
/// Write failures are logged and swallowed: losing the cache only costs a
/// refetch on the next start.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    schema_version: u32,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_schema_version(backend, SCHEMA_VERSION)
    }

    /// Store tagging entries with a non-default schema version.
    pub fn with_schema_version(backend: Arc<dyn CacheBackend>, schema_version: u32) -> Self {
        Self {
            backend,
            schema_version,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Persist `dataset` with a fresh timestamp and the given ETag.
    ///
    /// Returns the written entry, or `None` when the write failed. A quota
    /// failure triggers one eviction pass and one retry.
    pub async fn save(&self, dataset: &[ProductRecord], etag: Option<&str>) -> Option<CacheEntry> {
        self.save_at(dataset, etag, Utc::now()).await
    }

    /// Persist the bundled fallback dataset, tagged as such.
    pub async fn save_fallback(&self, dataset: &[ProductRecord]) -> Option<CacheEntry> {
        self.save(dataset, Some(FALLBACK_ETAG)).await
    }

    /// Re-stamp an entry's storage time without changing its data or ETag.
    pub async fn touch(&self, entry: &CacheEntry) -> Option<CacheEntry> {
        self.save(&entry.data, entry.etag.as_deref()).await
    }

    /// Persist with an explicit storage time.
    pub async fn save_at(
        &self,
        dataset: &[ProductRecord],
        etag: Option<&str>,
        stored_at: Timestamp,
    ) -> Option<CacheEntry> {
        let entry = CacheEntry {
            data: dataset.to_vec(),
            stored_at,
            etag: etag.map(str::to_string),
            schema_version: self.schema_version,
            checksum: Some(checksum(dataset)),
        };

        match self.write_entry(&entry).await {
            Ok(()) => {
                debug!(
                    records = entry.data.len(),
                    etag = ?entry.etag,
                    "cache entry saved"
                );
                Some(entry)
            }
            Err(e) => {
                warn!(error = %e, "failed to save cache entry");
                None
            }
        }
    }

    /// Write a prepared entry as-is, with one eviction retry on quota errors.
    pub async fn write_entry(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(entry).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;

        match self.backend.write_batch(entry_ops(&bytes, entry)).await {
            Err(StorageError::QuotaExceeded { key }) => {
                let evicted = self.evict_stale_keys().await;
                info!(key = %key, evicted, "storage quota exceeded, retrying after eviction");
                self.backend.write_batch(entry_ops(&bytes, entry)).await
            }
            other => other,
        }
    }

    /// Load and verify the persisted entry.
    ///
    /// Absent, unparsable, version-mismatched and checksum-mismatched entries
    /// all come back as `None`; the last three are deleted first.
    pub async fn load(&self) -> Option<CacheEntry> {
        let bytes = match self.backend.get(CACHE_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read cache entry");
                return None;
            }
        };

        match verify_entry(&bytes, self.schema_version) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                warn!(reason = %reason, "discarding cache entry");
                self.clear().await;
                None
            }
        }
    }

    /// Last stored ETag token, falling back to the one inside the entry.
    pub async fn token(&self) -> Option<String> {
        match self.backend.get(ETAG_KEY).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(token) if !token.is_empty() => return Some(token),
                _ => {}
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read etag token"),
        }
        self.load_etag_from_entry().await
    }

    /// Delete the entry and its ETag token.
    pub async fn clear(&self) {
        let ops = vec![WriteOp::delete(CACHE_KEY), WriteOp::delete(ETAG_KEY)];
        if let Err(e) = self.backend.write_batch(ops).await {
            warn!(error = %e, "failed to clear cache");
        }
    }

    async fn load_etag_from_entry(&self) -> Option<String> {
        let bytes = self.backend.get(CACHE_KEY).await.ok()??;
        let raw: Value = serde_json::from_slice(&bytes).ok()?;
        raw.get("etag")?
            .as_str()
            .filter(|etag| *etag != FALLBACK_ETAG)
            .map(str::to_string)
    }

    /// Remove leftover keys sharing the cache prefix, keeping the live entry.
    async fn evict_stale_keys(&self) -> usize {
        let keys = match self.backend.keys_with_prefix(CACHE_KEY).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list cache keys for eviction");
                return 0;
            }
        };

        let ops: Vec<WriteOp> = keys
            .into_iter()
            .filter(|key| key != CACHE_KEY)
            .map(WriteOp::delete)
            .collect();
        let count = ops.len();
        if count == 0 {
            return 0;
        }

        match self.backend.write_batch(ops).await {
            Ok(()) => count,
            Err(e) => {
                warn!(error = %e, "eviction failed");
                0
            }
        }
    }
}

fn entry_ops(bytes: &[u8], entry: &CacheEntry) -> Vec<WriteOp> {
    let token_op = match entry.etag.as_deref() {
        Some(etag) if etag != FALLBACK_ETAG => WriteOp::put(ETAG_KEY, etag.as_bytes().to_vec()),
        _ => WriteOp::delete(ETAG_KEY),
    };
    vec![WriteOp::put(CACHE_KEY, bytes.to_vec()), token_op]
}

/// Decode a stored entry and check it can be trusted.
///
/// The schema version is read before the full decode so that entries from an
/// older layout are reported as a version mismatch rather than as garbage.
pub fn verify_entry(bytes: &[u8], expected_version: u32) -> Result<CacheEntry, CorruptionError> {
    let raw: Value = serde_json::from_slice(bytes).map_err(|e| CorruptionError::Unparsable {
        reason: e.to_string(),
    })?;

    let found = raw
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| CorruptionError::Unparsable {
            reason: "missing schema_version".to_string(),
        })?;
    if found != u64::from(expected_version) {
        return Err(CorruptionError::SchemaVersionMismatch {
            expected: expected_version,
            found: u32::try_from(found).unwrap_or(u32::MAX),
        });
    }

    let entry: CacheEntry =
        serde_json::from_value(raw).map_err(|e| CorruptionError::Unparsable {
            reason: e.to_string(),
        })?;

    let stored = entry
        .checksum
        .as_deref()
        .ok_or(CorruptionError::MissingChecksum)?;
    let actual = checksum(&entry.data);
    if stored != actual {
        return Err(CorruptionError::ChecksumMismatch {
            expected: stored.to_string(),
            actual,
        });
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use proptest::prelude::*;

    fn records() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new("100200", "Milk", 10).with_units_per_pack(12),
            ProductRecord::new("100300", "Kefir", 7).with_manufacturer("Dairy"),
        ]
    }

    fn store() -> (CacheStore, Arc<MemoryCacheBackend>) {
        let backend = Arc::new(MemoryCacheBackend::new());
        (CacheStore::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let (store, _) = store();
        let saved = store
            .save(&records(), Some("\"v1\""))
            .await
            .expect("save should succeed");

        let loaded = store.load().await.expect("entry should load");
        assert_eq!(loaded.data, records());
        assert_eq!(loaded.etag.as_deref(), Some("\"v1\""));
        assert_eq!(loaded, saved);
        assert_eq!(store.token().await.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_load_absent() {
        let (store, _) = store();
        assert!(store.load().await.is_none());
        assert!(store.token().await.is_none());
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_deleted() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let old = CacheStore::with_schema_version(backend.clone(), SCHEMA_VERSION - 1);
        old.save(&records(), Some("\"v1\"")).await.expect("save");

        let current = CacheStore::new(backend.clone());
        assert!(current.load().await.is_none());
        assert!(backend.get(CACHE_KEY).await.expect("get").is_none());
        assert!(backend.get(ETAG_KEY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_deleted() {
        let (store, backend) = store();
        let mut entry = store.save(&records(), None).await.expect("save");
        entry.data[0].shelf_life_days = 999;
        let bytes = serde_json::to_vec(&entry).expect("serialize");
        backend.put(CACHE_KEY, bytes).await.expect("put");

        assert!(store.load().await.is_none());
        assert!(backend.get(CACHE_KEY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_missing_checksum_is_deleted() {
        let (store, backend) = store();
        let mut entry = store.save(&records(), None).await.expect("save");
        entry.checksum = None;
        backend
            .put(CACHE_KEY, serde_json::to_vec(&entry).expect("serialize"))
            .await
            .expect("put");

        assert!(store.load().await.is_none());
        assert!(backend.get(CACHE_KEY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_unparsable_is_deleted() {
        let (store, backend) = store();
        backend
            .put(CACHE_KEY, b"{not json".to_vec())
            .await
            .expect("put");
        assert!(store.load().await.is_none());
        assert!(backend.get(CACHE_KEY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_fallback_entry_has_no_token() {
        let (store, backend) = store();
        store.save(&records(), Some("\"v1\"")).await.expect("save");
        let entry = store.save_fallback(&records()).await.expect("save");

        assert!(entry.is_fallback());
        assert!(backend.get(ETAG_KEY).await.expect("get").is_none());
        assert!(store.token().await.is_none());
    }

    #[tokio::test]
    async fn test_token_falls_back_to_entry_etag() {
        let (store, backend) = store();
        store.save(&records(), Some("\"v2\"")).await.expect("save");
        backend.delete(ETAG_KEY).await.expect("delete");
        assert_eq!(store.token().await.as_deref(), Some("\"v2\""));
    }

    #[tokio::test]
    async fn test_touch_restamps_only_timestamp() {
        let (store, _) = store();
        let old_time = Utc::now() - chrono::Duration::hours(30);
        let entry = store
            .save_at(&records(), Some("\"v1\""), old_time)
            .await
            .expect("save");

        let touched = store.touch(&entry).await.expect("touch");
        assert!(touched.stored_at > entry.stored_at);
        assert_eq!(touched.data, entry.data);
        assert_eq!(touched.etag, entry.etag);
        assert_eq!(touched.checksum, entry.checksum);
    }

    #[tokio::test]
    async fn test_quota_eviction_then_retry() {
        let payload_len = serde_json::to_vec(&CacheEntry {
            data: records(),
            stored_at: Utc::now(),
            etag: None,
            schema_version: SCHEMA_VERSION,
            checksum: Some(checksum(&records())),
        })
        .expect("serialize")
        .len();

        let backend = Arc::new(MemoryCacheBackend::with_quota(payload_len + 64));
        backend
            .put("products_cache_legacy", vec![0; payload_len])
            .await
            .expect("legacy fits alone");

        let store = CacheStore::new(backend.clone());
        assert!(store.save(&records(), None).await.is_some());
        assert!(backend
            .get("products_cache_legacy")
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_quota_failure_is_swallowed() {
        let backend = Arc::new(MemoryCacheBackend::with_quota(8));
        let store = CacheStore::new(backend);
        assert!(store.save(&records(), None).await.is_none());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, _) = store();
        store.save(&records(), Some("\"v1\"")).await.expect("save");
        store.clear().await;
        assert!(store.load().await.is_none());
        assert!(store.token().await.is_none());
    }

    proptest! {
        /// Property: a stored entry with a tampered field never verifies.
        #[test]
        fn prop_tampered_entry_never_verifies(
            days in proptest::collection::vec(1u32..5000, 1..10),
            bump in 1u32..100,
        ) {
            let data: Vec<ProductRecord> = days
                .iter()
                .enumerate()
                .map(|(i, d)| ProductRecord::new(i.to_string(), "p", *d))
                .collect();
            let mut entry = CacheEntry {
                checksum: Some(checksum(&data)),
                data,
                stored_at: Utc::now(),
                etag: None,
                schema_version: SCHEMA_VERSION,
            };
            let bytes = serde_json::to_vec(&entry).expect("serialize");
            prop_assert!(verify_entry(&bytes, SCHEMA_VERSION).is_ok());

            entry.data[0].shelf_life_days += bump;
            let bytes = serde_json::to_vec(&entry).expect("serialize");
            let is_checksum_mismatch = matches!(
                verify_entry(&bytes, SCHEMA_VERSION),
                Err(CorruptionError::ChecksumMismatch { .. })
            );
            prop_assert!(is_checksum_mismatch);
        }
    }
}
