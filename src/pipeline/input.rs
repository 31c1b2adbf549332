//! Input resolution: validate a user-supplied source before any engine
//! touches it.
//!
//! pdfium reports a missing file and a truncated download with the same
//! opaque error, so we check existence, permissions and the `%PDF` magic
//! bytes ourselves first and return a specific [`KoshaError`].

use crate::error::KoshaError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a segmenter input turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A (scanned) PDF that needs rendering and OCR.
    Pdf(PathBuf),
    /// A raw OCR text dump (`kosha ocr` output or any UTF-8 text).
    Text(PathBuf),
}

impl SourceKind {
    pub fn path(&self) -> &Path {
        match self {
            SourceKind::Pdf(p) | SourceKind::Text(p) => p,
        }
    }
}

/// Validate that `path` is a readable PDF.
pub fn resolve_pdf(path: &Path) -> Result<PathBuf, KoshaError> {
    match open_and_read_magic(path)? {
        Some(magic) if &magic != b"%PDF" => Err(KoshaError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        }),
        _ => {
            debug!("Resolved local PDF: {}", path.display());
            Ok(path.to_path_buf())
        }
    }
}

/// Classify a segmenter input by its magic bytes: `%PDF` is rendered and
/// OCR'd, everything else is read as a UTF-8 text dump.
pub fn resolve_source(path: &Path) -> Result<SourceKind, KoshaError> {
    match open_and_read_magic(path)? {
        Some(magic) if &magic == b"%PDF" => Ok(SourceKind::Pdf(path.to_path_buf())),
        _ => Ok(SourceKind::Text(path.to_path_buf())),
    }
}

/// Open the file, mapping failures to input errors, and return its first
/// four bytes (`None` for files shorter than that).
fn open_and_read_magic(path: &Path) -> Result<Option<[u8; 4]>, KoshaError> {
    if !path.exists() {
        return Err(KoshaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(KoshaError::ReadFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            Ok(f.read_exact(&mut magic).ok().map(|_| magic))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(KoshaError::PermissionDenied {
            path: path.to_path_buf(),
        }),
        Err(_) => Err(KoshaError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}
