//! OCR Segmenter: scanned chapter PDF → ordered sloka records.
//!
//! Pages are rendered a few at a time (a 300 DPI kosha page is ~35 MB as
//! RGBA), recognised in document order, then concatenated and split into
//! slokas so a verse that runs across a page break still closes as one
//! record.
//!
//! The same splitting runs on a raw OCR text dump, which lets a dump be
//! hand-fixed and re-segmented without running Tesseract again.

use crate::config::SegmentConfig;
use crate::error::KoshaError;
use crate::output::{SegmentOutput, SegmentStats};
use crate::pipeline::input::{self, SourceKind};
use crate::pipeline::ocr::TextRecognizer;
use crate::pipeline::{render, slokas};
use crate::progress::Stage;
use crate::record::{RecordCollection, RecordMeta};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pages rasterised per pdfium call.
const RENDER_BATCH_PAGES: usize = 4;

/// Raw OCR text of every page, in document order.
#[derive(Debug, Clone, Default)]
pub struct RecognizedPages {
    pub pages: Vec<String>,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
}

/// Render every page of `pdf` and recognise it with `recognizer`.
pub async fn recognize_pdf(
    pdf: impl AsRef<Path>,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<RecognizedPages, KoshaError> {
    let pdf_path = input::resolve_pdf(pdf.as_ref())?;
    let total_pages = render::page_count(&pdf_path).await?;
    info!("OCR of {} ({} pages)", pdf_path.display(), total_pages);

    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Ocr, total_pages);
    }

    let mut out = RecognizedPages {
        pages: Vec::with_capacity(total_pages),
        ..Default::default()
    };
    let indices: Vec<usize> = (0..total_pages).collect();

    for batch in indices.chunks(RENDER_BATCH_PAGES) {
        let render_start = Instant::now();
        let rendered = render::render_pages_at_dpi(&pdf_path, config.dpi, batch).await?;
        out.render_duration_ms += render_start.elapsed().as_millis() as u64;

        for (idx, image) in rendered {
            let page_num = idx + 1;
            let ocr_start = Instant::now();
            let text = recognizer.recognize(page_num, &image).await?;
            out.ocr_duration_ms += ocr_start.elapsed().as_millis() as u64;

            let chars = text.chars().count();
            if chars == 0 {
                warn!("Page {}: OCR produced no text", page_num);
            }
            if let Some(ref cb) = config.progress {
                cb.on_page_complete(page_num, total_pages, chars);
            }
            out.pages.push(text);
        }
    }

    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(Stage::Ocr, total_pages, out.pages.len());
    }
    info!(
        "Recognised {} pages (render {}ms, OCR {}ms)",
        out.pages.len(),
        out.render_duration_ms,
        out.ocr_duration_ms
    );
    Ok(out)
}

/// Split already-recognised page texts into a record collection.
///
/// Deterministic: the same page texts always give the same collection.
pub fn segment_pages(pages: &[String], config: &SegmentConfig) -> SegmentOutput {
    let joined = pages.join("\n");
    let mut out = segment_text(&joined, config);
    out.stats.pages = pages.len();
    out
}

/// Split one raw OCR text into a record collection. Repeated slokas keep
/// their first position.
pub fn segment_text(text: &str, config: &SegmentConfig) -> SegmentOutput {
    let split = slokas::split_slokas(text, config);
    let mut collection = RecordCollection::new();
    let mut duplicates = 0;
    for sloka in split.slokas {
        if !collection.insert(sloka.clone(), RecordMeta::default()) {
            debug!("Duplicate sloka dropped: {}", sloka);
            duplicates += 1;
        }
    }

    let stats = SegmentStats {
        raw_chars: text.chars().count(),
        records: collection.len(),
        discarded: split.discarded,
        duplicates,
        ..Default::default()
    };
    SegmentOutput { collection, stats }
}

/// OCR a chapter PDF and segment it.
pub async fn segment_pdf(
    pdf: impl AsRef<Path>,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<SegmentOutput, KoshaError> {
    let recognized = recognize_pdf(pdf, config, recognizer).await?;
    let mut out = segment_pages(&recognized.pages, config);
    out.stats.render_duration_ms = recognized.render_duration_ms;
    out.stats.ocr_duration_ms = recognized.ocr_duration_ms;
    info!(
        "Segmented {} records ({} discarded, {} duplicates)",
        out.stats.records, out.stats.discarded, out.stats.duplicates
    );
    Ok(out)
}

/// Segment a raw OCR text dump (e.g. written by [`ocr_pdf_to_text`]).
pub async fn segment_text_file(
    path: impl AsRef<Path>,
    config: &SegmentConfig,
) -> Result<SegmentOutput, KoshaError> {
    let path = path.as_ref();
    let text = read_text(path).await?;
    let mut out = segment_text(&text, config);
    out.stats.pages = count_page_markers(&text);
    Ok(out)
}

/// Segment either kind of source, sniffing PDF vs. text by magic bytes.
pub async fn segment_source(
    source: impl AsRef<Path>,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<SegmentOutput, KoshaError> {
    match input::resolve_source(source.as_ref())? {
        SourceKind::Pdf(p) => segment_pdf(&p, config, recognizer).await,
        SourceKind::Text(p) => segment_text_file(&p, config).await,
    }
}

/// Segment `source` and write the record file to `output`.
pub async fn segment_to_file(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<SegmentStats, KoshaError> {
    let out = segment_source(source, config, recognizer).await?;
    out.collection.save(output.as_ref()).await?;
    Ok(out.stats)
}

/// OCR a PDF and write the raw text with `--- Page N ---` markers.
///
/// Returns the number of pages written.
pub async fn ocr_pdf_to_text(
    pdf: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<usize, KoshaError> {
    let output = output.as_ref();
    let recognized = recognize_pdf(pdf, config, recognizer).await?;
    let dump = format_page_dump(&recognized.pages);

    let write_err = |e| KoshaError::OutputWriteFailed {
        path: output.to_path_buf(),
        source: e,
    };
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }
    tokio::fs::write(output, dump).await.map_err(write_err)?;
    Ok(recognized.pages.len())
}

/// Raw dump format: one `--- Page N ---` header per page, 1-based.
pub fn format_page_dump(pages: &[String]) -> String {
    let mut s = String::new();
    for (i, text) in pages.iter().enumerate() {
        s.push_str(&format!("--- Page {} ---\n", i + 1));
        s.push_str(text.trim_end());
        s.push_str("\n\n");
    }
    s
}

fn count_page_markers(text: &str) -> usize {
    text.lines()
        .filter(|l| {
            let l = l.trim();
            l.starts_with("--- Page ") && l.ends_with("---")
        })
        .count()
}

async fn read_text(path: &Path) -> Result<String, KoshaError> {
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KoshaError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => KoshaError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => KoshaError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}
