//! Shelflife Sync - Dataset Load Pipeline
//!
//! Decides per load cycle whether to serve the cache, revalidate it, refetch
//! the dataset or fall back to the bundled sample, and keeps the in-memory
//! [`ProductIndex`](shelflife_core::ProductIndex) in step with the result.
//!
//! Components, leaves first:
//! - [`remote`]: the dataset endpoint (`HEAD` probe and streamed `GET`)
//! - [`freshness`]: ETag revalidation
//! - [`ingest`]: bounded, line-tolerant stream decoding
//! - [`orchestrator`]: the per-cycle state machine
//! - [`scheduler`]: the background resync timer
//! - [`session`]: lifecycle and connectivity events
//! - [`worker`]: off-thread search

pub mod freshness;
pub mod ingest;
pub mod orchestrator;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod ui;
pub mod worker;

pub use freshness::FreshnessChecker;
pub use ingest::{IngestError, Ingested, StreamIngestor};
pub use orchestrator::{LoadMode, LoadOrchestrator, LoadOutcome, LoadReport, LoadSettings};
pub use remote::{ByteStream, DatasetResponse, DatasetSource, HttpDatasetSource, ProbeResponse};
pub use scheduler::ResyncScheduler;
pub use session::Session;
pub use ui::{NoopUi, UiSink};
pub use worker::{SearchEntry, SearchWorker, WorkerRequest, WorkerResponse};
