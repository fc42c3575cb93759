//! Data load orchestrator.
//!
//! One load cycle reads the cache, optionally revalidates it, and ends in
//! exactly one of: index the cache, re-stamp and index the cache, fetch the
//! dataset, or seed the bundled fallback. Every path ends with a complete
//! index and, for foreground cycles, the loading indicator cleared once.
//!
//! Cycles do not overlap. A cycle started while another is in flight returns
//! [`LoadOutcome::Skipped`] immediately; the running cycle is not cancelled
//! and its result is applied when it finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use shelflife_core::config::DEFAULT_MAX_PAYLOAD_BYTES;
use shelflife_core::{
    fallback_dataset, validate_schema, CacheEntry, CacheState, Connectivity, FreshnessDecision,
    ProductIndex, ProductRecord, SchemaError, Severity, ShelfResult, StaleCachePolicy, SyncConfig,
    ValidatedDataset, DEFAULT_CACHE_EXPIRY,
};
use shelflife_storage::CacheStore;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::freshness::FreshnessChecker;
use crate::ingest::{IngestError, StreamIngestor};
use crate::remote::DatasetSource;
use crate::ui::{LoadingGuard, UiSink};

const MSG_UPDATED: &str = "Data updated";
const MSG_REFRESHED: &str = "Data refreshed in the background";
const MSG_OFFLINE_SAMPLE: &str = "No connection. Showing sample data";
const MSG_OFFLINE_STALE: &str = "No connection. Cached data may be out of date";
const MSG_FAILED_CACHED: &str = "Could not load fresh data. Using cached data";
const MSG_FAILED_SAMPLE: &str = "Could not load data. Showing sample data";

/// Whether a cycle shows the loading indicator and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Foreground,
    /// Silent resync: no loading indicator, only an info notification when
    /// new data was applied.
    Background,
}

/// How a load cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Dataset fetched, validated, cached and indexed.
    Fetched,
    /// Cached data indexed unchanged.
    Cached,
    /// Expired cache confirmed current; timestamp refreshed.
    Revalidated,
    /// Fetch failed; cached data indexed instead.
    StaleCache,
    /// Bundled sample data indexed, seeded or from the cache.
    Fallback,
    /// Another cycle was in flight (or the resync found nothing to do offline).
    Skipped,
}

/// Summary of one load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub decision: Option<FreshnessDecision>,
    pub outcome: LoadOutcome,
    /// Records in the index after the cycle.
    pub records: usize,
}

impl LoadReport {
    fn skipped(records: usize) -> Self {
        Self {
            decision: None,
            outcome: LoadOutcome::Skipped,
            records,
        }
    }
}

/// Thresholds the orchestrator needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSettings {
    pub cache_expiry: Duration,
    pub max_payload_bytes: u64,
    pub stale_cache_policy: StaleCachePolicy,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            stale_cache_policy: StaleCachePolicy::default(),
        }
    }
}

impl From<&SyncConfig> for LoadSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            cache_expiry: config.cache_expiry(),
            max_payload_bytes: config.max_payload_bytes,
            stale_cache_policy: config.stale_cache_policy,
        }
    }
}

/// Marks a cycle as in flight until dropped, then wakes idle waiters.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, idle })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Owner of the in-memory index and the persisted cache entry.
pub struct LoadOrchestrator {
    store: CacheStore,
    source: Arc<dyn DatasetSource>,
    checker: FreshnessChecker,
    ingestor: StreamIngestor,
    ui: Arc<dyn UiSink>,
    settings: LoadSettings,
    index: RwLock<Arc<ProductIndex>>,
    online: AtomicBool,
    in_flight: AtomicBool,
    idle: Notify,
}

impl std::fmt::Debug for LoadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOrchestrator")
            .field("settings", &self.settings)
            .field("online", &self.online.load(Ordering::Relaxed))
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LoadOrchestrator {
    pub fn new(
        store: CacheStore,
        source: Arc<dyn DatasetSource>,
        ui: Arc<dyn UiSink>,
        settings: LoadSettings,
    ) -> Self {
        Self {
            store,
            checker: FreshnessChecker::new(source.clone()),
            ingestor: StreamIngestor::new(settings.max_payload_bytes),
            source,
            ui,
            settings,
            index: RwLock::new(Arc::new(ProductIndex::default())),
            online: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    pub fn with_connectivity(self, connectivity: Connectivity) -> Self {
        self.set_connectivity(connectivity);
        self
    }

    pub fn connectivity(&self) -> Connectivity {
        Connectivity::from(self.online.load(Ordering::Acquire))
    }

    pub fn set_connectivity(&self, connectivity: Connectivity) {
        self.online
            .store(connectivity.is_online(), Ordering::Release);
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no cycle is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            if !self.is_loading() {
                return;
            }
            notified.await;
        }
    }

    /// Current index snapshot. Never a partially built one.
    pub fn index(&self) -> Arc<ProductIndex> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn notify(&self, message: &str, severity: Severity) {
        self.ui.on_notify(message, severity);
    }

    /// Run one foreground load cycle.
    pub async fn load(&self) -> LoadReport {
        self.foreground_cycle(false).await
    }

    /// Clear the cache store, then run one foreground load cycle.
    ///
    /// Nothing is cleared when another cycle is in flight.
    pub async fn reload(&self) -> LoadReport {
        self.foreground_cycle(true).await
    }

    async fn foreground_cycle(&self, clear_cache: bool) -> LoadReport {
        let Some(_cycle) = CycleGuard::try_acquire(&self.in_flight, &self.idle) else {
            debug!("load cycle already in flight, skipping");
            return LoadReport::skipped(self.index().len());
        };
        let _loading = LoadingGuard::new(self.ui.as_ref());

        if clear_cache {
            info!("clearing cache before reload");
            self.store.clear().await;
        }

        let connectivity = self.connectivity();
        let cached = self.store.load().await;
        let state = match &cached {
            Some(entry) => entry.state(self.settings.cache_expiry, Utc::now()),
            None => CacheState::Absent,
        };

        let update_found = match &cached {
            Some(entry) if FreshnessDecision::needs_probe(state, connectivity) => {
                Some(self.check_updates(entry, connectivity).await)
            }
            _ => None,
        };

        let decision = FreshnessDecision::decide(state, connectivity, update_found);
        info!(?state, ?connectivity, ?update_found, ?decision, "load decision");

        let outcome = match (decision, cached) {
            (FreshnessDecision::UseCacheAsIs, Some(entry)) => {
                if state == CacheState::Expired
                    && self.settings.stale_cache_policy == StaleCachePolicy::Warn
                {
                    self.notify(MSG_OFFLINE_STALE, Severity::Warning);
                }
                self.apply(entry.data);
                LoadOutcome::Cached
            }
            (FreshnessDecision::UseCacheAndRefreshTimestamp, Some(entry)) => {
                if self.store.touch(&entry).await.is_none() {
                    warn!("failed to refresh cache timestamp");
                }
                self.apply(entry.data);
                LoadOutcome::Revalidated
            }
            (FreshnessDecision::RefetchRequired, cached) => {
                self.refetch(cached, LoadMode::Foreground).await
            }
            (_, _) => {
                self.seed_fallback().await;
                self.notify(MSG_OFFLINE_SAMPLE, Severity::Warning);
                LoadOutcome::Fallback
            }
        };

        LoadReport {
            decision: Some(decision),
            outcome,
            records: self.index().len(),
        }
    }

    /// Run one silent resync: probe, and refetch only when the dataset changed.
    pub async fn resync(&self) -> LoadReport {
        let Some(_cycle) = CycleGuard::try_acquire(&self.in_flight, &self.idle) else {
            debug!("load cycle already in flight, skipping resync");
            return LoadReport::skipped(self.index().len());
        };

        let connectivity = self.connectivity();
        if !connectivity.is_online() {
            return LoadReport::skipped(self.index().len());
        }

        let cached = self.store.load().await;
        let update_found = match &cached {
            Some(entry) => self.check_updates(entry, connectivity).await,
            None => true,
        };

        if !update_found {
            debug!("background resync found no update");
            return LoadReport {
                decision: Some(FreshnessDecision::UseCacheAsIs),
                outcome: LoadOutcome::Cached,
                records: self.index().len(),
            };
        }

        info!("background resync found an update");
        let outcome = self.refetch(cached, LoadMode::Background).await;
        LoadReport {
            decision: Some(FreshnessDecision::RefetchRequired),
            outcome,
            records: self.index().len(),
        }
    }

    /// Sample data is replaced as soon as the endpoint is reachable.
    async fn check_updates(&self, entry: &CacheEntry, connectivity: Connectivity) -> bool {
        if entry.is_fallback() {
            debug!("cached entry is the fallback dataset, refetching");
            return connectivity.is_online();
        }
        let token = self.store.token().await;
        self.checker.has_updates(connectivity, token.as_deref()).await
    }

    async fn refetch(&self, cached: Option<CacheEntry>, mode: LoadMode) -> LoadOutcome {
        let had_cache = cached.is_some();

        match self.fetch_dataset().await {
            Ok((records, etag)) => {
                info!(records = records.len(), ?etag, "dataset fetched");
                self.apply(records.clone());
                if self.store.save(&records, etag.as_deref()).await.is_none() {
                    warn!("fetched dataset indexed but not cached");
                }
                match mode {
                    LoadMode::Foreground if had_cache => {
                        self.notify(MSG_UPDATED, Severity::Success)
                    }
                    LoadMode::Background => self.notify(MSG_REFRESHED, Severity::Info),
                    LoadMode::Foreground => {}
                }
                LoadOutcome::Fetched
            }
            Err(e) => {
                warn!(error = %e, had_cache, "dataset fetch failed");
                match cached {
                    Some(entry) if entry.is_fallback() => {
                        self.apply(entry.data);
                        if mode == LoadMode::Foreground {
                            self.notify(MSG_FAILED_SAMPLE, Severity::Error);
                        }
                        LoadOutcome::Fallback
                    }
                    Some(entry) => {
                        self.apply(entry.data);
                        if mode == LoadMode::Foreground {
                            self.notify(MSG_FAILED_CACHED, Severity::Warning);
                        }
                        LoadOutcome::StaleCache
                    }
                    None => {
                        self.seed_fallback().await;
                        if mode == LoadMode::Foreground {
                            self.notify(MSG_FAILED_SAMPLE, Severity::Error);
                        }
                        LoadOutcome::Fallback
                    }
                }
            }
        }
    }

    /// Fetch, decode and validate the remote dataset.
    ///
    /// The whole body is parsed once more as a single JSON document when no
    /// line of the stream decoded, when some lines were skipped, or when the
    /// streamed records fail validation.
    async fn fetch_dataset(&self) -> ShelfResult<(Vec<ProductRecord>, Option<String>)> {
        let response = self.source.fetch().await?;
        let etag = response.etag.clone();

        let ingested = match self.ingestor.ingest(response).await {
            Ok(ingested) => ingested,
            Err(IngestError::NoRecords { raw }) => {
                debug!(bytes = raw.len(), "streamed decode found nothing, parsing whole body");
                let validated = decode_whole_body(&raw)?;
                return Ok((validated.into_records(), etag));
            }
            Err(IngestError::Oversize(e)) => return Err(e.into()),
            Err(IngestError::Transport(e)) => return Err(e.into()),
        };

        let whole_body_tried = ingested.skipped_lines > 0;
        if whole_body_tried {
            debug!(
                skipped_lines = ingested.skipped_lines,
                "streamed decode skipped lines, parsing whole body"
            );
            match decode_whole_body(&ingested.raw) {
                Ok(validated) => return Ok((validated.into_records(), etag)),
                Err(e) => debug!(error = %e, "whole-body parse failed, keeping streamed records"),
            }
        }

        let streamed = validate_schema(&Value::Array(ingested.records));
        match streamed {
            Ok(validated) => Ok((validated.into_records(), etag)),
            Err(e) if !whole_body_tried => {
                debug!(error = %e, "streamed records invalid, parsing whole body");
                let validated = decode_whole_body(&ingested.raw).map_err(|_| e)?;
                Ok((validated.into_records(), etag))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn seed_fallback(&self) {
        let records = fallback_dataset();
        info!(records = records.len(), "seeding fallback dataset");
        self.apply(records.clone());
        if self.store.save_fallback(&records).await.is_none() {
            warn!("fallback dataset indexed but not cached");
        }
    }

    /// Build a new index and swap it in whole.
    fn apply(&self, records: Vec<ProductRecord>) {
        let index = Arc::new(ProductIndex::from_records(records));
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index.clone();
        debug!(records = index.len(), "index replaced");
        self.ui.on_index_ready(index);
    }
}

fn decode_whole_body(raw: &[u8]) -> Result<ValidatedDataset, SchemaError> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| SchemaError::Undecodable {
        reason: e.to_string(),
    })?;
    validate_schema(&value)
}
