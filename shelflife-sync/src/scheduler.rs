//! Background resync timer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::orchestrator::{LoadOrchestrator, LoadOutcome};

/// Periodic silent resync. At most one timer runs per scheduler; starting
/// again replaces the previous one.
#[derive(Debug)]
pub struct ResyncScheduler {
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ResyncScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer. The first tick fires one full period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, orchestrator: Arc<LoadOrchestrator>) {
        let period = self.period;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !orchestrator.connectivity().is_online() {
                    debug!("resync tick while offline, ignoring");
                    continue;
                }
                let report = orchestrator.resync().await;
                match report.outcome {
                    LoadOutcome::Skipped => debug!("resync tick skipped"),
                    outcome => debug!(?outcome, records = report.records, "resync tick done"),
                }
            }
        });

        let previous = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(period_secs = period.as_secs(), "background resync armed");
    }

    /// Disarm the timer. A resync already running is cancelled with it.
    ///
    /// Fetched data is indexed before it is cached, so a cancelled resync
    /// can leave the cache one dataset behind the index, never ahead of it.
    pub fn stop(&self) {
        let previous = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
            info!("background resync disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ResyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
