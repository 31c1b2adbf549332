//! Result and statistics types returned by each stage.

use crate::error::RecordError;
use crate::record::RecordCollection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of the Page Extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub output_path: PathBuf,
    /// Pages in the new document (`end - start + 1`).
    pub pages_extracted: usize,
    /// Pages in the source document.
    pub source_pages: usize,
}

/// Result of the OCR Segmenter.
#[derive(Debug, Clone)]
pub struct SegmentOutput {
    pub collection: RecordCollection,
    pub stats: SegmentStats,
}

/// Counters for one segmentation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentStats {
    /// Pages recognised (0 when segmenting a text dump).
    pub pages: usize,
    /// Characters of raw OCR text across all pages.
    pub raw_chars: usize,
    /// Records written.
    pub records: usize,
    /// Closed records dropped for being too short or empty.
    pub discarded: usize,
    /// Records whose text was already present (OCR of a repeated verse).
    pub duplicates: usize,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
}

/// What happened to one record during correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// 1-based position in the input collection.
    pub index: usize,
    pub original: String,
    /// Key under which the record was written.
    pub text: String,
    pub corrected: bool,
    pub retries: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub error: Option<RecordError>,
}

/// Result of the AI Corrector.
#[derive(Debug, Clone)]
pub struct CorrectionOutput {
    pub collection: RecordCollection,
    /// One entry per input record, in input order.
    pub outcomes: Vec<RecordOutcome>,
    pub stats: CorrectionStats,
}

/// Counters for one correction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionStats {
    /// Records in the input collection.
    pub total: usize,
    /// Records the service changed.
    pub corrected: usize,
    /// Records returned identical or empty.
    pub unchanged: usize,
    /// Records whose request failed after all retries (kept unchanged).
    pub failed: usize,
    /// Records dropped because both keys already existed.
    pub merged: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl CorrectionStats {
    /// Tally a finished set of outcomes.
    pub fn from_outcomes(outcomes: &[RecordOutcome], total_duration_ms: u64) -> Self {
        let mut s = CorrectionStats {
            total: outcomes.len(),
            total_duration_ms,
            ..Default::default()
        };
        for o in outcomes {
            match (&o.error, o.corrected) {
                (Some(RecordError::Merged { .. }), _) => s.merged += 1,
                (Some(RecordError::CorrectionFailed { .. }), _) => s.failed += 1,
                (None, true) => s.corrected += 1,
                (None, false) => s.unchanged += 1,
            }
            s.total_input_tokens += o.input_tokens as u64;
            s.total_output_tokens += o.output_tokens as u64;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, corrected: bool, error: Option<RecordError>) -> RecordOutcome {
        RecordOutcome {
            index,
            original: format!("s{index} ॥"),
            text: format!("s{index} ॥"),
            corrected,
            retries: 0,
            input_tokens: 10,
            output_tokens: 5,
            duration_ms: 1,
            error,
        }
    }

    #[test]
    fn stats_tally() {
        let outcomes = vec![
            outcome(1, true, None),
            outcome(2, false, None),
            outcome(
                3,
                false,
                Some(RecordError::CorrectionFailed {
                    index: 3,
                    retries: 3,
                    detail: "HTTP 503".into(),
                }),
            ),
            outcome(4, true, Some(RecordError::Merged { index: 4 })),
        ];
        let s = CorrectionStats::from_outcomes(&outcomes, 42);
        assert_eq!(s.total, 4);
        assert_eq!(s.corrected, 1);
        assert_eq!(s.unchanged, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.merged, 1);
        assert_eq!(s.total_input_tokens, 40);
        assert_eq!(s.total_output_tokens, 20);
        assert_eq!(s.total_duration_ms, 42);
    }
}
