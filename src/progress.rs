//! Progress-callback trait for extraction events.
//!
//! Inject an `Arc<dyn ExtractionProgress>` via
//! [`crate::config::ExtractionConfigBuilder::progress`] to receive status
//! messages and per-page events while a document is processed. Callers can
//! forward events to a progress bar, a log, or a UI channel without the
//! library knowing how the host application communicates.

use std::sync::Arc;

/// Called by the extraction pipeline as it advances through stages and pages.
///
/// Implementations must be `Send + Sync`; page events may fire concurrently
/// from the vision worker pool. All methods default to no-ops so callers
/// only override what they care about.
pub trait ExtractionProgress: Send + Sync {
    /// A human-readable stage transition, e.g. "quality gate: escalating".
    fn on_status(&self, message: &str) {
        let _ = message;
    }

    /// Fired just before a page is submitted to OCR or the vision model.
    fn on_page_start(&self, page_num: u32, total_pages: u32) {
        let _ = (page_num, total_pages);
    }

    /// Fired when a page yields rows (possibly zero) without error.
    fn on_page_complete(&self, page_num: u32, total_pages: u32, rows: usize) {
        let _ = (page_num, total_pages, rows);
    }

    /// Fired when a page gives up after retries and splits.
    fn on_page_error(&self, page_num: u32, total_pages: u32, error: &str) {
        let _ = (page_num, total_pages, error);
    }
}

/// No-op implementation, the default when no callback is configured.
pub struct NoopProgress;

impl ExtractionProgress for NoopProgress {}

/// Convenience alias matching the type stored in the config.
pub type ProgressHandle = Arc<dyn ExtractionProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracking {
        statuses: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgress for Tracking {
        fn on_status(&self, _message: &str) {
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _page: u32, _total: u32, _rows: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _page: u32, _total: u32, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let cb = NoopProgress;
        cb.on_status("starting");
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 12);
        cb.on_page_error(2, 3, "timeout");
    }

    #[test]
    fn tracking_receives_events() {
        let tracker = Arc::new(Tracking {
            statuses: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let cb: ProgressHandle = tracker.clone();
        cb.on_status("structured pass");
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 5);
        cb.on_page_error(2, 2, "gave up");
        assert_eq!(tracker.statuses.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
