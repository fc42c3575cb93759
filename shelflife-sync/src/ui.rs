//! UI collaborator seam.

use std::sync::Arc;

use shelflife_core::{ProductIndex, Severity};

/// Receiver of load-cycle events.
///
/// Calls arrive on whatever task runs the load cycle and must not block.
pub trait UiSink: Send + Sync {
    /// A fully built index replaced the previous one.
    fn on_index_ready(&self, index: Arc<ProductIndex>);

    fn on_load_start(&self);

    fn on_load_end(&self);

    fn on_notify(&self, message: &str, severity: Severity);
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUi;

impl UiSink for NoopUi {
    fn on_index_ready(&self, _index: Arc<ProductIndex>) {}
    fn on_load_start(&self) {}
    fn on_load_end(&self) {}
    fn on_notify(&self, _message: &str, _severity: Severity) {}
}

/// Shows the loading indicator for its lifetime.
///
/// `on_load_end` runs exactly once when the guard drops, on every exit path.
pub(crate) struct LoadingGuard<'a> {
    ui: &'a dyn UiSink,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn new(ui: &'a dyn UiSink) -> Self {
        ui.on_load_start();
        Self { ui }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.ui.on_load_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        starts: AtomicUsize,
        ends: AtomicUsize,
    }

    impl UiSink for Counter {
        fn on_index_ready(&self, _index: Arc<ProductIndex>) {}
        fn on_load_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_load_end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
        fn on_notify(&self, _message: &str, _severity: Severity) {}
    }

    #[test]
    fn test_guard_ends_once_on_drop() {
        let ui = Counter::default();
        {
            let _guard = LoadingGuard::new(&ui);
            assert_eq!(ui.starts.load(Ordering::SeqCst), 1);
            assert_eq!(ui.ends.load(Ordering::SeqCst), 0);
        }
        assert_eq!(ui.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_ends_on_early_return() {
        fn bail(ui: &dyn UiSink) -> Result<(), ()> {
            let _guard = LoadingGuard::new(ui);
            Err(())
        }

        let ui = Counter::default();
        assert!(bail(&ui).is_err());
        assert_eq!(ui.ends.load(Ordering::SeqCst), 1);
    }
}
