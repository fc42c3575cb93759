//! ETag revalidation.

use std::sync::Arc;

use shelflife_core::Connectivity;
use tracing::{debug, warn};

use crate::remote::{DatasetSource, ProbeResponse};

/// Answers "did the dataset change since `previous`?" with one probe.
///
/// Every doubtful answer is "no": transport errors, unexpected statuses and
/// responses without an ETag never trigger a refetch.
#[derive(Clone)]
pub struct FreshnessChecker {
    source: Arc<dyn DatasetSource>,
}

impl FreshnessChecker {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self { source }
    }

    pub async fn has_updates(&self, connectivity: Connectivity, previous: Option<&str>) -> bool {
        if !connectivity.is_online() {
            return false;
        }

        match self.source.probe(previous).await {
            Ok(ProbeResponse::NotModified) => false,
            Ok(ProbeResponse::Modified { etag: Some(etag) }) => {
                let changed = previous != Some(etag.as_str());
                debug!(?previous, current = %etag, changed, "revalidated dataset");
                changed
            }
            Ok(ProbeResponse::Modified { etag: None }) => {
                debug!("probe returned no etag, assuming unchanged");
                false
            }
            Ok(ProbeResponse::Status(status)) => {
                warn!(status, "unexpected probe status, assuming unchanged");
                false
            }
            Err(e) => {
                warn!(error = %e, "probe failed, assuming unchanged");
                false
            }
        }
    }
}
