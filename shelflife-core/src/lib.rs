//! Shelflife Core - Product Types
//!
//! Pure data structures and pure functions. All other crates depend on this.
//! Nothing in here performs I/O: the cache store, the remote source and the
//! load orchestrator live in `shelflife-storage` and `shelflife-sync`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub mod config;
pub mod error;
pub mod expiry;
pub mod fallback;
pub mod integrity;

pub use config::{StaleCachePolicy, SyncConfig};
pub use error::{
    ConfigError, CorruptionError, OversizeError, SchemaError, ShelfError, ShelfResult,
    StorageError, TransportError, ValidationError,
};
pub use expiry::{compute_expiry, format_expiry, parse_production_date, ExpiryRequest};
pub use fallback::fallback_dataset;
pub use integrity::{checksum, validate_schema, ValidatedDataset};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Shape tag of persisted cache entries. Bump when `ProductRecord` changes.
pub const SCHEMA_VERSION: u32 = 3;

/// Storage key holding the serialized [`CacheEntry`].
pub const CACHE_KEY: &str = "products_cache";

/// Storage key holding the last-seen ETag token.
pub const ETAG_KEY: &str = "products_etag";

/// ETag recorded on entries seeded from the bundled fallback dataset.
pub const FALLBACK_ETAG: &str = "fallback";

/// Age after which a cache entry is expired (still usable, never discarded).
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Period of the background resync timer.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Minimum search term length (in characters).
pub const MIN_SEARCH_TERM_CHARS: usize = 2;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// PRODUCT RECORDS
// ============================================================================

/// One product as published by the dataset endpoint.
///
/// Field names on the wire follow the upstream dataset, so cached snapshots
/// and remote payloads share one encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Код продукции")]
    pub code: String,

    #[serde(rename = "Полное наименование (русское)")]
    pub name: String,

    /// Shelf life in days, always positive.
    #[serde(rename = "Срок годности")]
    pub shelf_life_days: u32,

    #[serde(
        rename = "Штук в упаковке",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub units_per_pack: Option<u32>,

    #[serde(
        rename = "Штрихкод упаковки",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pack_barcode: Option<String>,

    #[serde(
        rename = "Производитель",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub manufacturer: Option<String>,

    #[serde(
        rename = "Название стандарта",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub standard: Option<String>,
}

impl ProductRecord {
    /// Create a record with only the required fields set.
    pub fn new(code: impl Into<String>, name: impl Into<String>, shelf_life_days: u32) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            shelf_life_days,
            units_per_pack: None,
            pack_barcode: None,
            manufacturer: None,
            standard: None,
        }
    }

    pub fn with_units_per_pack(mut self, units: u32) -> Self {
        self.units_per_pack = Some(units);
        self
    }

    pub fn with_pack_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.pack_barcode = Some(barcode.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standard = Some(standard.into());
        self
    }

    /// Check whether this record matches an already-lowercased search term.
    pub fn matches_term(&self, lowered_term: &str) -> bool {
        self.code.to_lowercase().contains(lowered_term)
            || self.name.to_lowercase().contains(lowered_term)
    }
}

// ============================================================================
// PRODUCT INDEX
// ============================================================================

/// Lookup table from product code to record.
///
/// Always built from scratch from a flat list; never patched in place.
/// When a code repeats, the later record wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductIndex {
    records: HashMap<String, ProductRecord>,
}

impl ProductIndex {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ProductRecord>,
    {
        let records = records
            .into_iter()
            .map(|record| (record.code.clone(), record))
            .collect();
        Self { records }
    }

    pub fn get(&self, code: &str) -> Option<&ProductRecord> {
        self.records.get(code)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProductRecord> {
        self.records.values()
    }

    /// Case-insensitive search over codes and names.
    ///
    /// Terms shorter than [`MIN_SEARCH_TERM_CHARS`] yield nothing. Results
    /// are sorted by code.
    pub fn search(&self, term: &str) -> Vec<&ProductRecord> {
        let Some(lowered) = normalize_search_term(term) else {
            return Vec::new();
        };
        let mut hits: Vec<&ProductRecord> = self
            .records
            .values()
            .filter(|record| record.matches_term(&lowered))
            .collect();
        hits.sort_by(|a, b| a.code.cmp(&b.code));
        hits
    }
}

/// Trim and lowercase a search term, or `None` when it is too short.
pub fn normalize_search_term(term: &str) -> Option<String> {
    let trimmed = term.trim();
    if trimmed.chars().count() < MIN_SEARCH_TERM_CHARS {
        return None;
    }
    Some(trimmed.to_lowercase())
}

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// Persisted snapshot of the last processed dataset.
///
/// Always written and replaced as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<ProductRecord>,
    pub stored_at: Timestamp,
    #[serde(default)]
    pub etag: Option<String>,
    pub schema_version: u32,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl CacheEntry {
    /// How long ago this entry was stored, clamped at zero.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Check if this entry is older than the freshness threshold.
    pub fn is_expired(&self, threshold: Duration, now: Timestamp) -> bool {
        self.age(now) > threshold
    }

    /// Classify this entry against the freshness threshold.
    pub fn state(&self, threshold: Duration, now: Timestamp) -> CacheState {
        if self.is_expired(threshold, now) {
            CacheState::Expired
        } else {
            CacheState::Fresh
        }
    }

    /// Check if this entry was seeded from the bundled fallback dataset.
    pub fn is_fallback(&self) -> bool {
        self.etag.as_deref() == Some(FALLBACK_ETAG)
    }
}

// ============================================================================
// FRESHNESS DECISION
// ============================================================================

/// Cache presence and age as seen at the start of a load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Fresh,
    Expired,
}

/// Whether the network is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// What a load cycle should do. Computed per cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessDecision {
    /// Index the cached snapshot as it is.
    UseCacheAsIs,
    /// Index the cached snapshot and re-stamp its storage time.
    UseCacheAndRefreshTimestamp,
    /// Fetch the full dataset from the remote endpoint.
    RefetchRequired,
    /// Seed and index the bundled fallback dataset.
    UseFallback,
}

impl FreshnessDecision {
    /// Decide the action for one load cycle.
    ///
    /// `update_found` is the freshness-check result; `None` means no check
    /// was made (offline, or no cache to revalidate) and reads as "no update".
    pub fn decide(
        cache: CacheState,
        connectivity: Connectivity,
        update_found: Option<bool>,
    ) -> Self {
        let update_found = update_found.unwrap_or(false);
        match (cache, connectivity) {
            (CacheState::Absent, Connectivity::Online) => Self::RefetchRequired,
            (CacheState::Absent, Connectivity::Offline) => Self::UseFallback,
            (_, Connectivity::Offline) => Self::UseCacheAsIs,
            (_, Connectivity::Online) if update_found => Self::RefetchRequired,
            (CacheState::Fresh, Connectivity::Online) => Self::UseCacheAsIs,
            (CacheState::Expired, Connectivity::Online) => Self::UseCacheAndRefreshTimestamp,
        }
    }

    /// Check if a freshness probe must run before deciding.
    pub fn needs_probe(cache: CacheState, connectivity: Connectivity) -> bool {
        cache != CacheState::Absent && connectivity.is_online()
    }
}

// ============================================================================
// UI NOTIFICATIONS
// ============================================================================

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

// ============================================================================
// TESTS
// ============================================================================
