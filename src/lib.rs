//! # kosha-digitizer
//!
//! Digitize scanned Sanskrit koshas (synonym dictionaries such as the
//! Amarakosha or Vaijayanti Kosha) into per-chapter YAML files of slokas.
//!
//! ## Pipeline Overview
//!
//! ```text
//! book.pdf
//!  │
//!  ├─ 1. Extract   copy a chapter's page range into Input/<kosha>/<khanda>/<file>.pdf
//!  ├─ 2. OCR       rasterise pages via pdfium (spawn_blocking) → Tesseract `san`
//!  ├─ 3. Segment   split text into ॥-terminated slokas, strip verse numbers
//!  ├─ 4. Correct   one Claude request per sloka, retry/backoff, re-key
//!  └─ 5. Output    Output/<kosha>/<khanda>/<file>.yaml
//! ```
//!
//! Each stage is usable on its own; the `kosha` binary exposes each as a
//! subcommand plus a `pipeline` command that chains 2–4.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kosha_digitizer::{
//!     build_corrector, correct_collection, segment_pdf, CorrectionBackend,
//!     CorrectionConfig, SegmentConfig, TesseractRecognizer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let seg = SegmentConfig::builder().title("आदिदेवाध्यायः").build()?;
//!     let tesseract = TesseractRecognizer::new(&seg).await?;
//!     let slokas = segment_pdf("Input/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.pdf", &seg, &tesseract).await?;
//!
//!     let cfg = CorrectionConfig::builder(CorrectionBackend::vertex("my-project", "us-east5")).build()?;
//!     let corrector = build_corrector(&cfg).await?;
//!     let out = correct_collection(&slokas.collection, corrector.as_ref(), &cfg).await?;
//!     out.collection.save("Output/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.yaml".as_ref()).await?;
//!     eprintln!("{}/{} corrected", out.stats.corrected, out.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `kosha` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | off     | Embed the pdfium library in the binary at build time |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! kosha-digitizer = { version = "0.3", default-features = false }
//! ```
//!
//! ## External tools
//!
//! * **pdfium** is downloaded and cached on first use (`pdfium-auto`).
//! * **Tesseract** with the `san` traineddata must be on `PATH`.
//! * **gcloud** is used for Vertex AI application-default credentials unless
//!   an access token is passed explicitly.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod correct;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod segment;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CorrectionBackend, CorrectionConfig, CorrectionConfigBuilder, KoshaPath, PageRange,
    SegmentConfig, SegmentConfigBuilder,
};
pub use correct::{correct_collection, correct_file, probe_models, ProbeResult, ProbeStatus};
pub use error::{CorrectionError, KoshaError, RecordError};
pub use extract::{extract_pages, extract_to_kosha};
pub use output::{
    CorrectionOutput, CorrectionStats, ExtractionOutput, RecordOutcome, SegmentOutput, SegmentStats,
};
pub use pipeline::llm::{
    build_corrector, ClaudeCorrector, Correction, Corrector, ProviderCorrector, VertexCredentials,
};
pub use pipeline::input::{resolve_source, SourceKind};
pub use pipeline::ocr::{TesseractRecognizer, TextRecognizer};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use record::{Record, RecordCollection, RecordMeta};
pub use segment::{
    ocr_pdf_to_text, recognize_pdf, segment_pages, segment_pdf, segment_source, segment_text,
    segment_text_file, segment_to_file,
};
