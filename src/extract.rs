//! Page Extractor: copy a contiguous page range out of a source PDF into a
//! new PDF.
//!
//! The range is validated before the source is opened, so a reversed range
//! never leaves a file behind. The source document is only ever read.

use crate::config::{KoshaPath, PageRange};
use crate::error::KoshaError;
use crate::output::ExtractionOutput;
use crate::pipeline::{input, render};
use std::path::Path;
use tracing::info;

/// Copy pages `range` of `source` into a new PDF at `destination`.
///
/// Missing parent directories of `destination` are created once the range
/// has been checked against the source's page count.
///
/// # Errors
/// - [`KoshaError::FileNotFound`] / [`KoshaError::NotAPdf`] for a bad source
/// - [`KoshaError::PageOutOfRange`] when `range.end()` exceeds the page count
/// - [`KoshaError::PdfWriteFailed`] / [`KoshaError::OutputWriteFailed`] when
///   the new document cannot be assembled or saved
pub async fn extract_pages(
    source: impl AsRef<Path>,
    range: PageRange,
    destination: impl AsRef<Path>,
) -> Result<ExtractionOutput, KoshaError> {
    let source = source.as_ref();
    let destination = destination.as_ref();
    info!(
        "Extracting pages {} from {} → {}",
        range,
        source.display(),
        destination.display()
    );

    let pdf_path = input::resolve_pdf(source)?;
    let source_pages = render::copy_page_range(&pdf_path, range, destination).await?;

    info!(
        "Extracted {} of {} pages to {}",
        range.page_count(),
        source_pages,
        destination.display()
    );

    Ok(ExtractionOutput {
        output_path: destination.to_path_buf(),
        pages_extracted: range.page_count(),
        source_pages,
    })
}

/// Validate a raw `(start, end)` pair and extract into the kosha hierarchy
/// (`Input/<kosha>/<khanda>/<file>`).
pub async fn extract_to_kosha(
    source: impl AsRef<Path>,
    start: usize,
    end: usize,
    target: &KoshaPath,
) -> Result<ExtractionOutput, KoshaError> {
    let range = PageRange::new(start, end)?;
    extract_pages(source, range, target.pdf_path()).await
}
