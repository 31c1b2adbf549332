//! Progress-callback trait for per-page and per-record events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::SegmentConfigBuilder::progress_callback`] or
//! [`crate::config::CorrectionConfigBuilder::progress_callback`] to receive
//! events as the OCR stage finishes pages and the corrector finishes slokas.
//!
//! The trait is `Send + Sync` because, with `concurrency > 1`, records
//! complete on whichever task finished the request.
//!
//! # Example
//!
//! ```rust
//! use kosha_digitizer::{CorrectionBackend, CorrectionConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     corrected: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_record_complete(&self, index: usize, total: usize, changed: bool) {
//!         if changed {
//!             self.corrected.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("sloka {}/{} done", index, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { corrected: AtomicUsize::new(0) });
//!
//! let config = CorrectionConfig::builder(CorrectionBackend::vertex("my-project", "us-east5"))
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Which stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Rasterise + recognise pages.
    Ocr,
    /// Per-record AI correction.
    Correction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ocr => write!(f, "OCR"),
            Stage::Correction => write!(f, "Correcting"),
        }
    }
}

/// Called by the pipeline as it processes pages and records.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Indices are 1-based.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first page or record of a stage.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called when a page has been rendered and recognised.
    ///
    /// * `chars` — characters of raw text Tesseract produced
    fn on_page_complete(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// Called just before the first correction request for a record.
    fn on_record_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a record has a final outcome.
    ///
    /// * `changed` — the service returned a different, non-empty text
    fn on_record_complete(&self, index: usize, total: usize, changed: bool) {
        let _ = (index, total, changed);
    }

    /// Called when a record's correction failed after all retries. The record
    /// is kept unchanged.
    fn on_record_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every page or record of a stage was attempted.
    ///
    /// * `success` — pages recognised, or records corrected
    fn on_stage_complete(&self, stage: Stage, total: usize, success: usize) {
        let _ = (stage, total, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the config structs.
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<(Stage, usize)>>,
        pages: AtomicUsize,
        changed: AtomicUsize,
        unchanged: AtomicUsize,
        errors: AtomicUsize,
        success: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage, total: usize) {
            self.stages.lock().unwrap().push((stage, total));
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _chars: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_complete(&self, _index: usize, _total: usize, changed: bool) {
            if changed {
                self.changed.fetch_add(1, Ordering::SeqCst);
            } else {
                self.unchanged.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_record_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _stage: Stage, _total: usize, success: usize) {
            self.success.store(success, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Ocr, 2);
        cb.on_page_complete(1, 2, 1200);
        cb.on_record_start(1, 5);
        cb.on_record_complete(1, 5, true);
        cb.on_record_error(2, 5, "timeout");
        cb.on_stage_complete(Stage::Correction, 5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage_start(Stage::Ocr, 2);
        tracker.on_page_complete(1, 2, 900);
        tracker.on_page_complete(2, 2, 870);
        tracker.on_stage_start(Stage::Correction, 3);
        tracker.on_record_complete(1, 3, true);
        tracker.on_record_complete(2, 3, false);
        tracker.on_record_error(3, 3, "HTTP 503");
        tracker.on_record_complete(3, 3, false);
        tracker.on_stage_complete(Stage::Correction, 3, 1);

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![(Stage::Ocr, 2), (Stage::Correction, 3)]
        );
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.changed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.unchanged.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Ocr.to_string(), "OCR");
        assert_eq!(Stage::Correction.to_string(), "Correcting");
    }
}
