//! Session lifecycle.
//!
//! A [`Session`] owns the orchestrator and the resync timer and turns
//! connectivity events into load cycles. It is the only place that arms or
//! disarms the timer.

use std::sync::Arc;

use chrono::NaiveDate;
use shelflife_core::{
    Connectivity, ExpiryRequest, ProductIndex, ProductRecord, Severity, ShelfResult, SyncConfig,
    ValidationError,
};
use shelflife_storage::{CacheStore, LmdbCacheBackend};
use tracing::{debug, info};

use crate::orchestrator::{LoadOrchestrator, LoadOutcome, LoadReport, LoadSettings};
use crate::remote::HttpDatasetSource;
use crate::scheduler::ResyncScheduler;
use crate::ui::UiSink;

const MSG_CONNECTION_LOST: &str = "Connection lost. Working offline";
const MSG_CONNECTION_RESTORED: &str = "Connection restored";
const MSG_REFRESH_OFFLINE: &str = "No connection. Refresh is not possible";

pub struct Session {
    orchestrator: Arc<LoadOrchestrator>,
    scheduler: ResyncScheduler,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("orchestrator", &self.orchestrator)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Session {
    pub fn new(orchestrator: Arc<LoadOrchestrator>, scheduler: ResyncScheduler) -> Self {
        Self {
            orchestrator,
            scheduler,
        }
    }

    /// Wire a session to the LMDB cache and the HTTP endpoint in `config`.
    pub fn from_config(
        config: &SyncConfig,
        ui: Arc<dyn UiSink>,
        connectivity: Connectivity,
    ) -> ShelfResult<Self> {
        config.validate()?;

        let backend = LmdbCacheBackend::new(&config.cache_path, config.cache_map_size_mb)
            .map_err(shelflife_core::StorageError::from)?;
        let store = CacheStore::new(Arc::new(backend));
        let source = HttpDatasetSource::new(&config.dataset_url, config.request_timeout())?;

        let orchestrator =
            LoadOrchestrator::new(store, Arc::new(source), ui, LoadSettings::from(config))
                .with_connectivity(connectivity);
        Ok(Self::new(
            Arc::new(orchestrator),
            ResyncScheduler::new(config.resync_interval()),
        ))
    }

    pub fn orchestrator(&self) -> &Arc<LoadOrchestrator> {
        &self.orchestrator
    }

    /// Run the startup load, then arm the resync timer if online.
    pub async fn start(&self) -> LoadReport {
        let report = self.orchestrator.load().await;
        self.arm_when_idle(&report).await;
        report
    }

    /// Arm the timer once no cycle is in flight. A skipped load means
    /// another cycle is still running; wait for it first.
    async fn arm_when_idle(&self, report: &LoadReport) {
        if report.outcome == LoadOutcome::Skipped {
            debug!("load cycle in flight, arming resync after it ends");
            self.orchestrator.wait_idle().await;
        }
        if self.orchestrator.connectivity().is_online() {
            self.scheduler.start(self.orchestrator.clone());
        }
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn on_connectivity_lost(&self) {
        info!("connectivity lost");
        self.orchestrator.set_connectivity(Connectivity::Offline);
        self.scheduler.stop();
        self.orchestrator
            .notify(MSG_CONNECTION_LOST, Severity::Warning);
    }

    /// Reload in the foreground, then re-arm the resync timer.
    pub async fn on_connectivity_restored(&self) -> LoadReport {
        info!("connectivity restored");
        self.orchestrator.set_connectivity(Connectivity::Online);
        self.orchestrator
            .notify(MSG_CONNECTION_RESTORED, Severity::Success);
        let report = self.orchestrator.load().await;
        self.arm_when_idle(&report).await;
        report
    }

    /// Drop the cache and reload from the endpoint. Refused while offline;
    /// skipped, with the cache kept, while another cycle is in flight.
    pub async fn force_refresh(&self) -> Option<LoadReport> {
        if !self.orchestrator.connectivity().is_online() {
            self.orchestrator
                .notify(MSG_REFRESH_OFFLINE, Severity::Error);
            return None;
        }
        info!("forced refresh");
        Some(self.orchestrator.reload().await)
    }

    pub fn is_resync_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn index(&self) -> Arc<ProductIndex> {
        self.orchestrator.index()
    }

    pub fn lookup(&self, code: &str) -> Option<ProductRecord> {
        self.index().get(code.trim()).cloned()
    }

    pub fn search(&self, term: &str) -> Vec<ProductRecord> {
        self.index().search(term).into_iter().cloned().collect()
    }

    /// Expiry date of `code` produced on `production_date`.
    pub fn expiry(
        &self,
        code: &str,
        production_date: Option<NaiveDate>,
    ) -> Result<NaiveDate, ValidationError> {
        let index = self.index();
        ExpiryRequest::new(index.get(code.trim()), production_date).calculate()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
