//! Shelflife Test Utilities
//!
//! Centralized test infrastructure for the Shelflife workspace:
//! - Proptest generators for product records and datasets
//! - A scripted dataset source that counts probes and fetches, and a
//!   delayed wrapper for overlapping cycles
//! - A UI sink that records every callback
//! - Fixtures for wiring an orchestrator over an in-memory cache

pub use shelflife_core::{
    fallback_dataset, CacheEntry, Connectivity, FreshnessDecision, ProductIndex, ProductRecord,
    Severity, TransportError, SCHEMA_VERSION,
};
pub use shelflife_storage::{CacheBackend, CacheStore, MemoryCacheBackend};
pub use shelflife_sync::{
    DatasetResponse, DatasetSource, LoadOrchestrator, LoadSettings, ProbeResponse, UiSink,
};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};

// ============================================================================
// SCRIPTED DATASET SOURCE
// ============================================================================

/// One scripted answer to `fetch`.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// 2xx with a body delivered as the given chunks.
    Body {
        etag: Option<String>,
        content_length: Option<u64>,
        chunks: Vec<Vec<u8>>,
    },
    /// Chunks followed by a mid-stream error.
    Broken {
        chunks: Vec<Vec<u8>>,
        error: TransportError,
    },
    Fail(TransportError),
}

impl FetchScript {
    /// JSON array body of `records`, declared length set.
    pub fn json(records: &[ProductRecord], etag: Option<&str>) -> Self {
        let body = dataset_json(records);
        Self::Body {
            etag: etag.map(str::to_string),
            content_length: Some(body.len() as u64),
            chunks: vec![body],
        }
    }

    /// Newline-delimited body of `records`, split into `chunk_size` pieces,
    /// no declared length.
    pub fn ndjson(records: &[ProductRecord], etag: Option<&str>, chunk_size: usize) -> Self {
        let body = dataset_ndjson(records);
        Self::Body {
            etag: etag.map(str::to_string),
            content_length: None,
            chunks: body.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect(),
        }
    }

    pub fn unreachable() -> Self {
        Self::Fail(TransportError::Unreachable {
            reason: "scripted network failure".to_string(),
        })
    }
}

/// [`DatasetSource`] answering from scripts.
///
/// Fetch scripts are consumed in order; once the queue is empty the last one
/// consumed repeats. Probes always return the configured answer.
#[derive(Debug)]
pub struct ScriptedSource {
    probe: Mutex<Result<ProbeResponse, TransportError>>,
    fetches: Mutex<VecDeque<FetchScript>>,
    last_fetch: Mutex<Option<FetchScript>>,
    probe_count: AtomicUsize,
    fetch_count: AtomicUsize,
    probed_etags: Mutex<Vec<Option<String>>>,
}

impl ScriptedSource {
    pub fn new(probe: Result<ProbeResponse, TransportError>, fetch: FetchScript) -> Self {
        Self {
            probe: Mutex::new(probe),
            fetches: Mutex::new(VecDeque::from([fetch])),
            last_fetch: Mutex::new(None),
            probe_count: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
            probed_etags: Mutex::new(Vec::new()),
        }
    }

    /// Source whose probe says "unchanged" and whose fetch serves `records`.
    pub fn unchanged(records: &[ProductRecord]) -> Self {
        Self::new(
            Ok(ProbeResponse::NotModified),
            FetchScript::json(records, Some("\"v1\"")),
        )
    }

    /// Source that fails every request.
    pub fn offline() -> Self {
        Self::new(
            Err(TransportError::Unreachable {
                reason: "scripted network failure".to_string(),
            }),
            FetchScript::unreachable(),
        )
    }

    pub fn set_probe(&self, probe: Result<ProbeResponse, TransportError>) {
        *self.probe.lock().unwrap_or_else(PoisonError::into_inner) = probe;
    }

    pub fn push_fetch(&self, fetch: FetchScript) {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fetch);
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// ETags carried by each probe, in order.
    pub fn probed_etags(&self) -> Vec<Option<String>> {
        self.probed_etags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_fetch(&self) -> Option<FetchScript> {
        let next = self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last_fetch.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(script) => {
                *last = Some(script.clone());
                Some(script)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl DatasetSource for ScriptedSource {
    async fn probe(&self, etag: Option<&str>) -> Result<ProbeResponse, TransportError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.probed_etags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(etag.map(str::to_string));
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch(&self) -> Result<DatasetResponse, TransportError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        match self.next_fetch() {
            Some(FetchScript::Body {
                etag,
                content_length,
                chunks,
            }) => Ok(DatasetResponse {
                etag,
                content_length,
                body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
            }),
            Some(FetchScript::Broken { chunks, error }) => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)));
                Ok(DatasetResponse {
                    etag: None,
                    content_length: None,
                    body: stream::iter(items).boxed(),
                })
            }
            Some(FetchScript::Fail(error)) => Err(error),
            None => Err(TransportError::Unreachable {
                reason: "no fetch scripted".to_string(),
            }),
        }
    }
}

/// Wraps a [`ScriptedSource`] so every fetch first sleeps for `delay`,
/// letting a second cycle start while the first is in flight.
#[derive(Debug)]
pub struct DelayedSource {
    pub inner: ScriptedSource,
    pub delay: Duration,
}

impl DelayedSource {
    pub fn new(inner: ScriptedSource, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl DatasetSource for DelayedSource {
    async fn probe(&self, etag: Option<&str>) -> Result<ProbeResponse, TransportError> {
        self.inner.probe(etag).await
    }

    async fn fetch(&self) -> Result<DatasetResponse, TransportError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch().await
    }
}

// ============================================================================
// RECORDING UI
// ============================================================================

/// One recorded UI callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    IndexReady { records: usize },
    LoadStart,
    LoadEnd,
    Notify { message: String, severity: Severity },
}

/// [`UiSink`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
    last_index: Mutex<Option<Arc<ProductIndex>>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, wanted: &UiEvent) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    pub fn load_starts(&self) -> usize {
        self.count(&UiEvent::LoadStart)
    }

    pub fn load_ends(&self) -> usize {
        self.count(&UiEvent::LoadEnd)
    }

    pub fn notifications(&self) -> Vec<(String, Severity)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Notify { message, severity } => Some((message, severity)),
                _ => None,
            })
            .collect()
    }

    pub fn severities(&self) -> Vec<Severity> {
        self.notifications().into_iter().map(|(_, s)| s).collect()
    }

    pub fn last_index(&self) -> Option<Arc<ProductIndex>> {
        self.last_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, event: UiEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl UiSink for RecordingUi {
    fn on_index_ready(&self, index: Arc<ProductIndex>) {
        self.push(UiEvent::IndexReady {
            records: index.len(),
        });
        *self
            .last_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(index);
    }

    fn on_load_start(&self) {
        self.push(UiEvent::LoadStart);
    }

    fn on_load_end(&self) {
        self.push(UiEvent::LoadEnd);
    }

    fn on_notify(&self, message: &str, severity: Severity) {
        self.push(UiEvent::Notify {
            message: message.to_string(),
            severity,
        });
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A small dataset distinct from the bundled fallback.
pub fn sample_records() -> Vec<ProductRecord> {
    vec![
        ProductRecord::new("100200", "Milk 3.2%", 10)
            .with_units_per_pack(12)
            .with_pack_barcode("4600000000017")
            .with_manufacturer("Dairy Plant No. 1"),
        ProductRecord::new("100300", "Kefir 1%", 7).with_units_per_pack(12),
        ProductRecord::new("200100", "Butter 82.5%", 60).with_standard("GOST 32261-2013"),
    ]
}

/// Serialize records as one JSON array.
pub fn dataset_json(records: &[ProductRecord]) -> Vec<u8> {
    serde_json::to_vec(records).unwrap_or_default()
}

/// Serialize records as newline-delimited JSON.
pub fn dataset_ndjson(records: &[ProductRecord]) -> Vec<u8> {
    let mut body = Vec::new();
    for record in records {
        if let Ok(line) = serde_json::to_vec(record) {
            body.extend_from_slice(&line);
            body.push(b'\n');
        }
    }
    body
}

/// Records of an index sorted by code.
pub fn sorted_records(index: &ProductIndex) -> Vec<ProductRecord> {
    let mut records: Vec<ProductRecord> = index.records().cloned().collect();
    records.sort_by(|a, b| a.code.cmp(&b.code));
    records
}

/// Sort a dataset by code for comparison with [`sorted_records`].
pub fn sorted(mut records: Vec<ProductRecord>) -> Vec<ProductRecord> {
    records.sort_by(|a, b| a.code.cmp(&b.code));
    records
}

/// Everything a scenario test needs, wired over an in-memory cache.
pub struct Harness {
    pub backend: Arc<MemoryCacheBackend>,
    pub store: CacheStore,
    pub source: Arc<ScriptedSource>,
    pub ui: Arc<RecordingUi>,
    pub orchestrator: Arc<LoadOrchestrator>,
}

impl Harness {
    pub fn new(source: ScriptedSource, connectivity: Connectivity) -> Self {
        Self::with_settings(source, connectivity, LoadSettings::default())
    }

    pub fn with_settings(
        source: ScriptedSource,
        connectivity: Connectivity,
        settings: LoadSettings,
    ) -> Self {
        Self::with_backend(
            Arc::new(MemoryCacheBackend::new()),
            source,
            connectivity,
            settings,
        )
    }

    pub fn with_backend(
        backend: Arc<MemoryCacheBackend>,
        source: ScriptedSource,
        connectivity: Connectivity,
        settings: LoadSettings,
    ) -> Self {
        let store = CacheStore::new(backend.clone());
        let source = Arc::new(source);
        let ui = Arc::new(RecordingUi::new());
        let orchestrator = Arc::new(
            LoadOrchestrator::new(store.clone(), source.clone(), ui.clone(), settings)
                .with_connectivity(connectivity),
        );
        Self {
            backend,
            store,
            source,
            ui,
            orchestrator,
        }
    }

    /// Seed the cache with `records` stored `age` ago.
    pub async fn seed_cache(
        &self,
        records: &[ProductRecord],
        etag: Option<&str>,
        age: chrono::Duration,
    ) -> CacheEntry {
        self.store
            .save_at(records, etag, Utc::now() - age)
            .await
            .expect("seeding the cache must succeed")
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use shelflife_core::ProductRecord;

    pub fn arb_code() -> impl Strategy<Value = String> {
        "[0-9]{6}"
    }

    /// Records as the validator would emit them: no surrounding whitespace,
    /// no empty optional text.
    pub fn arb_product_record() -> impl Strategy<Value = ProductRecord> {
        (
            arb_code(),
            "[A-Za-z][A-Za-z0-9%.]{0,8}( [A-Za-z0-9%.]{1,8}){0,2}",
            1u32..=3650,
            proptest::option::of(1u32..=144),
            proptest::option::of("[0-9]{13}"),
            proptest::option::of("[A-Za-z]{1,10}( [A-Za-z]{1,10})?"),
            proptest::option::of("(GOST|TU) [0-9]{5}-20[0-9]{2}"),
        )
            .prop_map(
                |(code, name, days, units, barcode, manufacturer, standard)| ProductRecord {
                    code,
                    name,
                    shelf_life_days: days,
                    units_per_pack: units,
                    pack_barcode: barcode,
                    manufacturer,
                    standard,
                },
            )
    }

    /// Dataset with unique codes.
    pub fn arb_dataset(max_len: usize) -> impl Strategy<Value = Vec<ProductRecord>> {
        proptest::collection::btree_map(arb_code(), arb_product_record(), 1..=max_len.max(1))
            .prop_map(|by_code| {
                by_code
                    .into_iter()
                    .map(|(code, record)| ProductRecord { code, ..record })
                    .collect()
            })
    }
}
