//! Configuration types for the three digitization stages.
//!
//! Each stage gets its own config struct so a caller running only the
//! extractor never has to think about OCR languages or API credentials:
//!
//! * [`PageRange`] + [`KoshaPath`] — what the Page Extractor copies and where
//! * [`SegmentConfig`] — rendering DPI, Tesseract language, sloka filtering
//! * [`CorrectionConfig`] — correction backend, credentials, retry policy
//!
//! Credentials and project identifiers live in [`CorrectionBackend`] and are
//! handed to the corrector at construction time. The library never reads
//! them from the environment; the CLI does that through clap's `env =`.

use crate::error::KoshaError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Page Extractor ───────────────────────────────────────────────────────

/// An inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    start: usize,
    end: usize,
}

impl PageRange {
    /// Validate and build a range. Bounds against the document are checked
    /// later, once the page count is known.
    pub fn new(start: usize, end: usize) -> Result<Self, KoshaError> {
        if start < 1 || start > end {
            return Err(KoshaError::InvalidPageRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of pages covered.
    pub fn page_count(&self) -> usize {
        self.end - self.start + 1
    }

    /// Check the range against a document with `total` pages.
    pub fn check_bounds(&self, total: usize) -> Result<(), KoshaError> {
        if self.start > total {
            return Err(KoshaError::PageOutOfRange {
                page: self.start,
                total,
            });
        }
        if self.end > total {
            return Err(KoshaError::PageOutOfRange {
                page: self.end,
                total,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The Dictionary → Section → Chapter naming hierarchy
/// (kosha → khanda → adhyaya), encoded purely as directories.
///
/// ```rust
/// use kosha_digitizer::KoshaPath;
///
/// let p = KoshaPath::new("Vaijayanti_Kosha", "1_SvargaKhanda", "1_AdiDevaadhyaayah.pdf");
/// assert_eq!(
///     p.pdf_path().to_str().unwrap(),
///     "Input/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.pdf"
/// );
/// assert_eq!(
///     p.yaml_path().to_str().unwrap(),
///     "Output/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.yaml"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KoshaPath {
    pub kosha: String,
    pub khanda: String,
    pub file: String,
    /// Root for extracted chapter PDFs. Default: `Input`.
    pub input_root: PathBuf,
    /// Root for sloka YAML files. Default: `Output`.
    pub output_root: PathBuf,
}

impl KoshaPath {
    pub fn new(kosha: impl Into<String>, khanda: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            kosha: kosha.into(),
            khanda: khanda.into(),
            file: file.into(),
            input_root: PathBuf::from("Input"),
            output_root: PathBuf::from("Output"),
        }
    }

    pub fn with_roots(mut self, input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        self.input_root = input_root.into();
        self.output_root = output_root.into();
        self
    }

    /// `Input/<kosha>/<khanda>/<file>`
    pub fn pdf_path(&self) -> PathBuf {
        self.input_root.join(&self.kosha).join(&self.khanda).join(&self.file)
    }

    /// `Output/<kosha>/<khanda>/<file stem>.yaml`
    pub fn yaml_path(&self) -> PathBuf {
        let stem = std::path::Path::new(&self.file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.clone());
        self.output_root
            .join(&self.kosha)
            .join(&self.khanda)
            .join(format!("{stem}.yaml"))
    }
}

// ── OCR Segmenter ────────────────────────────────────────────────────────

/// Header/footer fragments that mark running heads on kosha pages
/// ("…कोषः", "…काण्डः", "…अध्यायः"). Lines containing them are not verse.
pub const DEFAULT_HEADER_MARKERS: &[&str] = &["कोषः", "काण्डः", "अध्यायः"];

/// Configuration for the OCR Segmenter.
#[derive(Clone)]
pub struct SegmentConfig {
    /// Rasterisation resolution. Range: 72–600. Default: 300.
    ///
    /// Tesseract's Devanagari models are trained on ~300 DPI scans; lower
    /// values merge matras into the akshara above them.
    pub dpi: u32,

    /// Tesseract language code. Default: `san`.
    pub language: String,

    /// Tesseract executable. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Adhyaya title in Devanagari, e.g. "आदिदेवाध्यायः". Lines containing it
    /// are treated as headings and skipped.
    pub title: Option<String>,

    /// Khanda name in Devanagari, e.g. "स्वर्गकाण्डः". Skipped like `title`.
    pub khanda: Option<String>,

    /// Records of this many characters or fewer (after cleanup) are OCR
    /// noise such as stray page furniture. Default: 15.
    pub min_record_chars: usize,

    /// Running-head fragments; any line containing one is skipped.
    pub header_markers: Vec<String>,

    /// Optional per-page progress events.
    pub progress: Option<ProgressCallback>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: "san".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            title: None,
            khanda: None,
            min_record_chars: 15,
            header_markers: DEFAULT_HEADER_MARKERS.iter().map(|s| s.to_string()).collect(),
            progress: None,
        }
    }
}

impl fmt::Debug for SegmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentConfig")
            .field("dpi", &self.dpi)
            .field("language", &self.language)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("title", &self.title)
            .field("khanda", &self.khanda)
            .field("min_record_chars", &self.min_record_chars)
            .field("header_markers", &self.header_markers)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ProgressCallback>"))
            .finish()
    }
}

impl SegmentConfig {
    pub fn builder() -> SegmentConfigBuilder {
        SegmentConfigBuilder {
            config: Self::default(),
        }
    }

    /// Every string whose presence marks a line as a heading.
    pub(crate) fn skip_fragments(&self) -> Vec<&str> {
        self.header_markers
            .iter()
            .map(String::as_str)
            .chain(self.title.as_deref())
            .chain(self.khanda.as_deref())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

/// Builder for [`SegmentConfig`].
#[derive(Debug)]
pub struct SegmentConfigBuilder {
    config: SegmentConfig,
}

impl SegmentConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn khanda(mut self, khanda: impl Into<String>) -> Self {
        self.config.khanda = Some(khanda.into());
        self
    }

    pub fn min_record_chars(mut self, n: usize) -> Self {
        self.config.min_record_chars = n;
        self
    }

    pub fn header_markers(mut self, markers: Vec<String>) -> Self {
        self.config.header_markers = markers;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    pub fn build(self) -> Result<SegmentConfig, KoshaError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(KoshaError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.language.trim().is_empty() {
            return Err(KoshaError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── AI Corrector ─────────────────────────────────────────────────────────

/// Default Vertex AI region for Claude models.
pub const DEFAULT_VERTEX_REGION: &str = "us-east5";

/// Default correction model on Vertex AI.
pub const DEFAULT_VERTEX_MODEL: &str = "claude-3-5-haiku@20241022";

/// Default correction model on the Anthropic API.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Which correction service to talk to, with its connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionBackend {
    /// Claude on Google Cloud Vertex AI, authenticated with
    /// application-default credentials.
    Vertex {
        project_id: String,
        region: String,
        /// Explicit OAuth access token. When `None` the token is obtained
        /// from `gcloud auth application-default print-access-token`.
        access_token: Option<String>,
    },
    /// Claude on the Anthropic API, authenticated with a bearer API key.
    Anthropic { api_key: String },
    /// Any `edgequake-llm` provider by name (openai, gemini, ollama, …).
    /// The provider reads its own key variable.
    Provider { name: String },
}

impl CorrectionBackend {
    pub fn vertex(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        CorrectionBackend::Vertex {
            project_id: project_id.into(),
            region: region.into(),
            access_token: None,
        }
    }

    /// Short name for logs and error messages.
    pub fn name(&self) -> &str {
        match self {
            CorrectionBackend::Vertex { .. } => "vertex",
            CorrectionBackend::Anthropic { .. } => "anthropic",
            CorrectionBackend::Provider { name } => name,
        }
    }

    /// The model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            CorrectionBackend::Vertex { .. } => DEFAULT_VERTEX_MODEL,
            CorrectionBackend::Anthropic { .. } => DEFAULT_ANTHROPIC_MODEL,
            CorrectionBackend::Provider { .. } => "gpt-4.1-mini",
        }
    }
}

impl fmt::Debug for CorrectionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionBackend::Vertex {
                project_id,
                region,
                access_token,
            } => f
                .debug_struct("Vertex")
                .field("project_id", project_id)
                .field("region", region)
                .field("access_token", &access_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            CorrectionBackend::Anthropic { .. } => f
                .debug_struct("Anthropic")
                .field("api_key", &"<redacted>")
                .finish(),
            CorrectionBackend::Provider { name } => {
                f.debug_struct("Provider").field("name", name).finish()
            }
        }
    }
}

/// Configuration for the AI Corrector.
///
/// # Example
/// ```rust
/// use kosha_digitizer::{CorrectionBackend, CorrectionConfig};
///
/// let config = CorrectionConfig::builder(CorrectionBackend::vertex("my-project", "us-east5"))
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_model(), "claude-3-5-haiku@20241022");
/// ```
#[derive(Clone)]
pub struct CorrectionConfig {
    pub backend: CorrectionBackend,

    /// Model id. If `None`, uses [`CorrectionBackend::default_model`].
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.0; corrections must be faithful.
    pub temperature: f32,

    /// Maximum tokens per corrected sloka. Default: 1024.
    pub max_tokens: usize,

    /// Retries per record on transient failure. Default: 3.
    pub max_retries: u32,

    /// Initial backoff in ms, doubled on every retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Records corrected at once. Default: 1 (strictly sequential).
    /// Output order is document order regardless.
    pub concurrency: usize,

    /// Custom system prompt. If `None`, uses the built-in Sanskrit prompt.
    pub system_prompt: Option<String>,

    /// Per-request timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional per-record progress events.
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for CorrectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrectionConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl CorrectionConfig {
    pub fn new(backend: CorrectionBackend) -> Self {
        Self {
            backend,
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            concurrency: 1,
            system_prompt: None,
            api_timeout_secs: 60,
            progress: None,
        }
    }

    pub fn builder(backend: CorrectionBackend) -> CorrectionConfigBuilder {
        CorrectionConfigBuilder {
            config: Self::new(backend),
        }
    }

    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }
}

/// Builder for [`CorrectionConfig`].
#[derive(Debug)]
pub struct CorrectionConfigBuilder {
    config: CorrectionConfig,
}

impl CorrectionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CorrectionConfig, KoshaError> {
        let c = &self.config;
        match &c.backend {
            CorrectionBackend::Vertex {
                project_id, region, ..
            } => {
                if project_id.trim().is_empty() {
                    return Err(KoshaError::ProviderNotConfigured {
                        provider: "vertex".into(),
                        hint: "A Google Cloud project id is required (--project-id).".into(),
                    });
                }
                if region.trim().is_empty() {
                    return Err(KoshaError::InvalidConfig("Vertex region must not be empty".into()));
                }
            }
            CorrectionBackend::Anthropic { api_key } => {
                if api_key.trim().is_empty() {
                    return Err(KoshaError::ProviderNotConfigured {
                        provider: "anthropic".into(),
                        hint: "Set ANTHROPIC_API_KEY or pass --api-key.".into(),
                    });
                }
            }
            CorrectionBackend::Provider { name } => {
                if name.trim().is_empty() {
                    return Err(KoshaError::InvalidConfig("Provider name must not be empty".into()));
                }
            }
        }
        if c.max_tokens == 0 {
            return Err(KoshaError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_rejects_reversed() {
        let err = PageRange::new(20, 10).unwrap_err();
        assert!(matches!(err, KoshaError::InvalidPageRange { start: 20, end: 10 }));
    }

    #[test]
    fn page_range_rejects_zero() {
        assert!(PageRange::new(0, 3).is_err());
    }

    #[test]
    fn page_range_len_and_display() {
        let r = PageRange::new(15, 16).unwrap();
        assert_eq!(r.page_count(), 2);
        assert_eq!(r.to_string(), "15-16");
    }

    #[test]
    fn page_range_bounds() {
        let r = PageRange::new(3, 5).unwrap();
        assert!(r.check_bounds(5).is_ok());
        assert!(matches!(
            r.check_bounds(4),
            Err(KoshaError::PageOutOfRange { page: 5, total: 4 })
        ));
        assert!(matches!(
            PageRange::new(7, 8).unwrap().check_bounds(4),
            Err(KoshaError::PageOutOfRange { page: 7, total: 4 })
        ));
    }

    #[test]
    fn kosha_path_custom_roots() {
        let p = KoshaPath::new("Amarakosha", "1_Svargavarga", "1_Devaadhyaayah.pdf")
            .with_roots("/data/in", "/data/out");
        assert_eq!(
            p.pdf_path(),
            PathBuf::from("/data/in/Amarakosha/1_Svargavarga/1_Devaadhyaayah.pdf")
        );
        assert_eq!(
            p.yaml_path(),
            PathBuf::from("/data/out/Amarakosha/1_Svargavarga/1_Devaadhyaayah.yaml")
        );
    }

    #[test]
    fn segment_defaults() {
        let c = SegmentConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.language, "san");
        assert_eq!(c.min_record_chars, 15);
    }

    #[test]
    fn segment_dpi_validation() {
        assert!(SegmentConfig::builder().dpi(50).build().is_err());
        assert!(SegmentConfig::builder().dpi(400).build().is_ok());
    }

    #[test]
    fn skip_fragments_include_display_strings() {
        let c = SegmentConfig::builder()
            .title("आदिदेवाध्यायः")
            .khanda("स्वर्गकाण्डः")
            .build()
            .unwrap();
        let frags = c.skip_fragments();
        assert!(frags.contains(&"आदिदेवाध्यायः"));
        assert!(frags.contains(&"स्वर्गकाण्डः"));
        assert!(frags.contains(&"कोषः"));
    }

    #[test]
    fn vertex_requires_project() {
        let err = CorrectionConfig::builder(CorrectionBackend::vertex("", "us-east5"))
            .build()
            .unwrap_err();
        assert!(matches!(err, KoshaError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn anthropic_requires_key() {
        let err = CorrectionConfig::builder(CorrectionBackend::Anthropic {
            api_key: "  ".into(),
        })
        .build()
        .unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = CorrectionConfig::new(CorrectionBackend::Anthropic {
            api_key: "sk-ant-secret".into(),
        });
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn concurrency_floor() {
        let c = CorrectionConfig::builder(CorrectionBackend::vertex("p", "us-east5"))
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
    }
}
