//! PDF access through pdfium: page counting, rasterisation at a fixed DPI
//! and page-range copying.
//!
//! pdfium keeps thread-local state and its calls are CPU-bound, so every
//! entry point here moves the work onto `tokio::task::spawn_blocking` and
//! binds a fresh `Pdfium` instance on that thread.
//!
//! Unlike a vision-model pipeline, Tesseract wants a physical resolution
//! rather than a pixel budget: a page is rendered at `width_pts * dpi / 72`
//! pixels wide so glyph size matches what the Devanagari models saw in
//! training.

use crate::config::PageRange;
use crate::error::KoshaError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// Bind the pdfium shared library, downloading it on first use.
pub(crate) fn bind_pdfium() -> Result<Pdfium, KoshaError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| KoshaError::PdfiumBindingFailed(e.to_string()))
}

fn load_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, KoshaError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| KoshaError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

async fn run_blocking<T, F>(what: &str, f: F) -> Result<T, KoshaError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, KoshaError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KoshaError::Internal(format!("{what} task panicked: {e}")))?
}

/// Number of pages in a PDF.
pub async fn page_count(pdf_path: &Path) -> Result<usize, KoshaError> {
    let path = pdf_path.to_path_buf();
    run_blocking("Page count", move || {
        let pdfium = bind_pdfium()?;
        let document = load_document(&pdfium, &path)?;
        Ok(document.pages().len() as usize)
    })
    .await
}

/// Rasterise selected pages of a PDF at `dpi`.
///
/// # Returns
/// `(page_index_0based, DynamicImage)` tuples in the order of `page_indices`.
pub async fn render_pages_at_dpi(
    pdf_path: &Path,
    dpi: u32,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, KoshaError> {
    let path = pdf_path.to_path_buf();
    let indices = page_indices.to_vec();
    run_blocking("Render", move || render_blocking(&path, dpi, &indices)).await
}

fn render_blocking(
    pdf_path: &Path,
    dpi: u32,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, KoshaError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    debug!("PDF loaded: {} pages, rendering {} at {} DPI", total_pages, page_indices.len(), dpi);

    let scale = dpi as f32 / POINTS_PER_INCH;
    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            return Err(KoshaError::PageOutOfRange {
                page: idx + 1,
                total: total_pages,
            });
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| KoshaError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let width_px = (page.width().value * scale).round().max(1.0) as i32;
        let height_px = (page.height().value * scale).round().max(1.0) as i32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| KoshaError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}

/// Copy `range` from `src` into a brand-new document saved at `dest`.
///
/// The range is checked against the source's page count before anything is
/// written, including `dest`'s parent directories. Returns the source page
/// count.
pub async fn copy_page_range(src: &Path, range: PageRange, dest: &Path) -> Result<usize, KoshaError> {
    let src = src.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();
    run_blocking("Extract", move || copy_blocking(&src, range, &dest)).await
}

fn copy_blocking(src: &Path, range: PageRange, dest: &Path) -> Result<usize, KoshaError> {
    let pdfium = bind_pdfium()?;
    let source = load_document(&pdfium, src)?;
    let total = source.pages().len() as usize;
    range.check_bounds(total)?;

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| KoshaError::OutputWriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
        }
    }

    let write_err = |detail: String| KoshaError::PdfWriteFailed {
        path: dest.to_path_buf(),
        detail,
    };

    let mut out = pdfium
        .create_new_pdf()
        .map_err(|e| write_err(format!("{:?}", e)))?;

    // pdfium page indices are 0-based u16.
    let first = (range.start() - 1) as u16;
    let last = (range.end() - 1) as u16;
    out.pages_mut()
        .copy_page_range_from_document(&source, first..=last, 0)
        .map_err(|e| write_err(format!("{:?}", e)))?;

    out.save_to_file(dest)
        .map_err(|e| write_err(format!("{:?}", e)))?;

    debug!(
        "Copied pages {} of {} ({} pages) → {}",
        range,
        src.display(),
        total,
        dest.display()
    );
    Ok(total)
}
