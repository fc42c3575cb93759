//! Off-thread search.
//!
//! The worker runs on its own OS thread with a flattened copy of the index
//! and talks to the caller only through channels. Results can arrive after a
//! newer query was issued; the client keeps only the latest by sequence
//! number.

use std::io;
use std::thread::{self, JoinHandle};

use shelflife_core::{normalize_search_term, ProductIndex, ProductRecord};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// Flattened record held by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub code: String,
    pub name: String,
    pub shelf_life_days: u32,
}

impl From<&ProductRecord> for SearchEntry {
    fn from(record: &ProductRecord) -> Self {
        Self {
            code: record.code.clone(),
            name: record.name.clone(),
            shelf_life_days: record.shelf_life_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Replace the worker's entries.
    SetData(Vec<SearchEntry>),
    Search { seq: u64, term: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    DataReady { count: usize },
    SearchResults { seq: u64, hits: Vec<SearchEntry> },
}

/// Client handle of a search worker thread.
///
/// Dropping the handle closes the request channel and joins the thread.
#[derive(Debug)]
pub struct SearchWorker {
    requests: Option<UnboundedSender<WorkerRequest>>,
    responses: UnboundedReceiver<WorkerResponse>,
    thread: Option<JoinHandle<()>>,
    last_seq: u64,
}

impl SearchWorker {
    pub fn spawn() -> io::Result<Self> {
        let (request_tx, request_rx) = unbounded_channel();
        let (response_tx, response_rx) = unbounded_channel();

        let thread = thread::Builder::new()
            .name("shelflife-search".to_string())
            .spawn(move || run(request_rx, response_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            thread: Some(thread),
            last_seq: 0,
        })
    }

    /// Send a fresh copy of `index`. Returns false if the worker is gone.
    pub fn set_data(&mut self, index: &ProductIndex) -> bool {
        let entries = index.records().map(SearchEntry::from).collect();
        self.send(WorkerRequest::SetData(entries))
    }

    /// Issue a query and return its sequence number.
    pub fn search(&mut self, term: impl Into<String>) -> u64 {
        self.last_seq += 1;
        let seq = self.last_seq;
        self.send(WorkerRequest::Search {
            seq,
            term: term.into(),
        });
        seq
    }

    /// Next raw response, or `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<WorkerResponse> {
        self.responses.recv().await
    }

    /// Wait for the results of the most recent query, discarding stale ones.
    pub async fn latest_results(&mut self) -> Option<Vec<SearchEntry>> {
        while let Some(response) = self.responses.recv().await {
            match response {
                WorkerResponse::SearchResults { seq, hits } if seq == self.last_seq => {
                    return Some(hits);
                }
                WorkerResponse::SearchResults { seq, .. } => {
                    trace!(seq, latest = self.last_seq, "discarding stale results");
                }
                WorkerResponse::DataReady { count } => {
                    trace!(count, "search worker data ready");
                }
            }
        }
        None
    }

    fn send(&self, request: WorkerRequest) -> bool {
        match &self.requests {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("search worker thread panicked");
            }
        }
    }
}

struct Indexed {
    entry: SearchEntry,
    code_lower: String,
    name_lower: String,
}

fn run(
    mut requests: UnboundedReceiver<WorkerRequest>,
    responses: UnboundedSender<WorkerResponse>,
) {
    let mut entries: Vec<Indexed> = Vec::new();

    while let Some(request) = requests.blocking_recv() {
        let response = match request {
            WorkerRequest::SetData(data) => {
                entries = data
                    .into_iter()
                    .map(|entry| Indexed {
                        code_lower: entry.code.to_lowercase(),
                        name_lower: entry.name.to_lowercase(),
                        entry,
                    })
                    .collect();
                entries.sort_by(|a, b| a.entry.code.cmp(&b.entry.code));
                WorkerResponse::DataReady {
                    count: entries.len(),
                }
            }
            WorkerRequest::Search { seq, term } => {
                let hits = match normalize_search_term(&term) {
                    Some(lowered) => entries
                        .iter()
                        .filter(|e| e.code_lower.contains(&lowered) || e.name_lower.contains(&lowered))
                        .map(|e| e.entry.clone())
                        .collect(),
                    None => Vec::new(),
                };
                WorkerResponse::SearchResults { seq, hits }
            }
        };

        if responses.send(response).is_err() {
            break;
        }
    }
    debug!("search worker stopped");
}
