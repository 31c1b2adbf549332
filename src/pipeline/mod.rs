//! Pipeline stages for kosha digitization.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the OCR engine or correction service can be swapped
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ ocr ──▶ slokas ──▶ llm ──▶ postprocess
//! (path)    (pdfium)   (PNG)     (tess)  (split)    (Claude)  (cleanup)
//! ```
//!
//! 1. [`input`]  — validate the source path and sniff PDF vs. text dump
//! 2. [`render`] — rasterise pages at a fixed DPI and copy page ranges;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — grayscale PNG bytes for the OCR engine
//! 4. [`ocr`]    — [`ocr::TextRecognizer`] and its Tesseract implementation
//! 5. [`slokas`] — deterministic split of raw text into `॥`-terminated records
//! 6. [`llm`]    — [`llm::Corrector`] backends with retry/backoff; the only
//!    stage with network I/O
//! 7. [`postprocess`] — normalise a correction reply to a single-line sloka

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod slokas;
