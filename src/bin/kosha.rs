//! CLI binary for kosha-digitizer.
//!
//! A thin shim over the library crate that maps subcommand flags to the
//! stage configs and prints per-stage counts.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kosha_digitizer::prompts::{ANTHROPIC_CANDIDATE_MODELS, VERTEX_CANDIDATE_MODELS};
use kosha_digitizer::{
    build_corrector, correct_collection, extract_pages, ocr_pdf_to_text, probe_models,
    resolve_source, segment_pdf, segment_text_file, CorrectionBackend, CorrectionConfig,
    CorrectionStats, KoshaPath, PageRange, PipelineProgressCallback, ProbeStatus,
    ProgressCallback, RecordCollection, SegmentConfig, SegmentStats, SourceKind, Stage,
    TesseractRecognizer,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per stage, per-page lines during OCR and a
/// line per failed record during correction.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, stage: Stage, total: usize) {
        let unit = match stage {
            Stage::Ocr => "pages",
            Stage::Correction => "slokas",
        };
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(stage.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.errors.store(0, Ordering::SeqCst);
        self.activate_bar(stage, total);
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, chars: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{chars:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_record_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Sloka {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg)
        ));
    }

    fn on_record_complete(&self, _index: usize, _total: usize, _changed: bool) {
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total: usize, success: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        match stage {
            Stage::Ocr => eprintln!("{} {} pages recognised", green("✔"), bold(&success.to_string())),
            Stage::Correction if failed == 0 => eprintln!(
                "{} {}/{} slokas corrected",
                green("✔"),
                bold(&success.to_string()),
                total
            ),
            Stage::Correction => eprintln!(
                "{} {}/{} slokas corrected  ({} failed, kept as OCR text)",
                cyan("⚠"),
                bold(&success.to_string()),
                total,
                red(&failed.to_string())
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 1. Copy pages 15-16 of the scanned book into the kosha hierarchy
  kosha extract books/vaijayanti.pdf --start 15 --end 16 \
      --kosha Vaijayanti_Kosha --khanda 1_SvargaKhanda --file 1_AdiDevaadhyaayah.pdf

  # 2. OCR + segment into Output/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.yaml
  kosha segment Input/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.pdf \
      --title आदिदेवाध्यायः --khanda-title स्वर्गकाण्डः \
      -o Output/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.yaml

  # 3. Correct with Claude on Vertex AI
  kosha correct Output/.../1_AdiDevaadhyaayah.yaml -o Output/.../1_AdiDevaadhyaayah.yaml \
      --project-id my-gcp-project

  # All of 2-3 in one go, keeping the uncorrected YAML
  kosha pipeline Input/.../1_AdiDevaadhyaayah.pdf -o Output/.../1_AdiDevaadhyaayah.yaml \
      --project-id my-gcp-project --keep-intermediate

  # Raw OCR text only (hand-fix it, then `kosha segment file.txt`)
  kosha ocr Input/.../1_AdiDevaadhyaayah.pdf -o /tmp/adideva.txt

  # Which Claude models does my project have access to?
  kosha probe --project-id my-gcp-project

ENVIRONMENT VARIABLES:
  GOOGLE_CLOUD_PROJECT    Vertex AI project id (--project-id)
  KOSHA_VERTEX_REGION     Vertex AI region (default us-east5)
  KOSHA_ACCESS_TOKEN      Explicit Vertex access token (else gcloud ADC)
  ANTHROPIC_API_KEY       Anthropic API key (--backend anthropic)
  KOSHA_BACKEND           vertex | anthropic | provider
  KOSHA_MODEL             Correction model id
  KOSHA_TESSERACT         Path to the tesseract binary
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  RUST_LOG                Log filter override (e.g. kosha_digitizer=debug)

SETUP:
  Tesseract with Sanskrit data:  apt install tesseract-ocr tesseract-ocr-san
  Vertex credentials:            gcloud auth application-default login
  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Digitize scanned Sanskrit kosha pages into sloka YAML.
#[derive(Parser, Debug)]
#[command(
    name = "kosha",
    version,
    about = "Digitize scanned Sanskrit kosha pages: extract, OCR, segment and AI-correct slokas",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "KOSHA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "KOSHA_QUIET")]
    quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "KOSHA_NO_PROGRESS")]
    no_progress: bool,

    /// Print run statistics as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a page range of a PDF into a new PDF.
    Extract(ExtractArgs),
    /// OCR a PDF into a raw text dump with page markers.
    Ocr(OcrArgs),
    /// OCR a PDF (or read a text dump) and write sloka YAML.
    Segment(SegmentArgs),
    /// AI-correct every sloka of a YAML file.
    Correct(CorrectArgs),
    /// OCR, segment and correct a PDF in one run.
    Pipeline(PipelineArgs),
    /// Find which candidate models the configured backend can reach.
    Probe(ProbeArgs),
}

/// `Input/<kosha>/<khanda>/<file>` naming.
#[derive(Args, Debug, Clone)]
struct HierarchyArgs {
    /// Kosha directory name (e.g. Vaijayanti_Kosha).
    #[arg(long, requires_all = ["khanda", "file"])]
    kosha: Option<String>,

    /// Khanda directory name (e.g. 1_SvargaKhanda).
    #[arg(long)]
    khanda: Option<String>,

    /// Chapter file name (e.g. 1_AdiDevaadhyaayah.pdf).
    #[arg(long)]
    file: Option<String>,

    /// Root of the PDF hierarchy.
    #[arg(long, env = "KOSHA_INPUT_ROOT", default_value = "Input")]
    input_root: PathBuf,

    /// Root of the YAML hierarchy.
    #[arg(long, env = "KOSHA_OUTPUT_ROOT", default_value = "Output")]
    output_root: PathBuf,
}

impl HierarchyArgs {
    fn kosha_path(&self) -> Option<KoshaPath> {
        match (&self.kosha, &self.khanda, &self.file) {
            (Some(k), Some(kh), Some(f)) => Some(
                KoshaPath::new(k, kh, f).with_roots(&self.input_root, &self.output_root),
            ),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Source PDF (never modified).
    source: PathBuf,

    /// First page, 1-indexed.
    #[arg(long)]
    start: usize,

    /// Last page, inclusive.
    #[arg(long)]
    end: usize,

    /// Explicit output path (instead of --kosha/--khanda/--file).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    hierarchy: HierarchyArgs,
}

/// Rendering and Tesseract options.
#[derive(Args, Debug, Clone)]
struct RecognizeArgs {
    /// Rendering DPI (72–600).
    #[arg(long, env = "KOSHA_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language code(s), e.g. san or san+eng.
    #[arg(short, long, env = "KOSHA_LANG", default_value = "san")]
    lang: String,

    /// Tesseract executable.
    #[arg(long, env = "KOSHA_TESSERACT", default_value = "tesseract")]
    tesseract: String,
}

/// Segmentation options.
#[derive(Args, Debug, Clone)]
struct SplitArgs {
    /// Adhyaya title in Devanagari; lines containing it are skipped.
    #[arg(long)]
    title: Option<String>,

    /// Khanda title in Devanagari; lines containing it are skipped.
    #[arg(long)]
    khanda_title: Option<String>,

    /// Slokas of this many characters or fewer are dropped as noise.
    #[arg(long, env = "KOSHA_MIN_CHARS", default_value_t = 15)]
    min_chars: usize,
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// Chapter PDF.
    pdf: PathBuf,

    /// Output text file. Default: the PDF path with a .txt extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    recognize: RecognizeArgs,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Chapter PDF or raw OCR text dump. Omit when using --kosha/--khanda/--file.
    source: Option<PathBuf>,

    /// Output YAML. Default: Output/<kosha>/<khanda>/<file>.yaml.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    hierarchy: HierarchyArgs,

    #[command(flatten)]
    recognize: RecognizeArgs,

    #[command(flatten)]
    split: SplitArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    /// Claude on Google Cloud Vertex AI.
    Vertex,
    /// Claude on the Anthropic API.
    Anthropic,
    /// Any edgequake-llm provider (see --provider).
    Provider,
}

/// Correction service options.
#[derive(Args, Debug, Clone)]
struct ServiceArgs {
    /// Correction backend.
    #[arg(long, env = "KOSHA_BACKEND", value_enum, default_value = "vertex")]
    backend: BackendArg,

    /// Google Cloud project id (vertex).
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    project_id: Option<String>,

    /// Vertex AI region (vertex).
    #[arg(long, env = "KOSHA_VERTEX_REGION", default_value = "us-east5")]
    region: String,

    /// Explicit OAuth access token (vertex). Default: gcloud ADC.
    #[arg(long, env = "KOSHA_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Anthropic API key (anthropic).
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// edgequake-llm provider name: openai, gemini, ollama, … (provider).
    #[arg(long, env = "KOSHA_PROVIDER")]
    provider: Option<String>,

    /// Model id. Default depends on the backend.
    #[arg(long, env = "KOSHA_MODEL")]
    model: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "KOSHA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

impl ServiceArgs {
    fn backend(&self) -> Result<CorrectionBackend> {
        Ok(match self.backend {
            BackendArg::Vertex => CorrectionBackend::Vertex {
                project_id: self.project_id.clone().unwrap_or_default(),
                region: self.region.clone(),
                access_token: self.access_token.clone(),
            },
            BackendArg::Anthropic => CorrectionBackend::Anthropic {
                api_key: self.api_key.clone().unwrap_or_default(),
            },
            BackendArg::Provider => match &self.provider {
                Some(name) => CorrectionBackend::Provider { name: name.clone() },
                None => bail!("--backend provider needs --provider (e.g. openai, gemini, ollama)"),
            },
        })
    }
}

/// Correction batch options.
#[derive(Args, Debug, Clone)]
struct CorrectionArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Records corrected at once. Output order is unaffected.
    #[arg(short, long, env = "KOSHA_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per record on transient failure.
    #[arg(long, env = "KOSHA_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Max output tokens per sloka.
    #[arg(long, env = "KOSHA_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, env = "KOSHA_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "KOSHA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CorrectArgs {
    /// Sloka YAML written by `kosha segment`.
    input: PathBuf,

    /// Output YAML (may equal the input).
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    correction: CorrectionArgs,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Chapter PDF. Omit when using --kosha/--khanda/--file.
    pdf: Option<PathBuf>,

    /// Output YAML. Default: Output/<kosha>/<khanda>/<file>.yaml.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the uncorrected YAML next to the output (<stem>.ocr.yaml).
    #[arg(long)]
    keep_intermediate: bool,

    #[command(flatten)]
    hierarchy: HierarchyArgs,

    #[command(flatten)]
    recognize: RecognizeArgs,

    #[command(flatten)]
    split: SplitArgs,

    #[command(flatten)]
    correction: CorrectionArgs,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Comma-separated model ids to try. Default: built-in Claude list.
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are redundant while a progress bar is drawn.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // Extract and probe finish in one step and draw no bar.
    let progress = move || -> Option<ProgressCallback> {
        show_progress.then(|| CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    };

    match &cli.command {
        Command::Extract(args) => run_extract(&cli, args).await,
        Command::Ocr(args) => run_ocr(&cli, args, progress()).await,
        Command::Segment(args) => run_segment(&cli, args, progress).await,
        Command::Correct(args) => run_correct(&cli, args, progress()).await,
        Command::Pipeline(args) => run_pipeline(&cli, args, progress()).await,
        Command::Probe(args) => run_probe(&cli, args).await,
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────

async fn run_extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    // Validate before touching pdfium or the filesystem.
    let range = PageRange::new(args.start, args.end)?;
    let destination = match (&args.output, args.hierarchy.kosha_path()) {
        (Some(p), _) => p.clone(),
        (None, Some(kp)) => kp.pdf_path(),
        (None, None) => bail!("Give --output or all of --kosha/--khanda/--file"),
    };

    ensure_pdfium(cli.quiet)?;
    let out = extract_pages(&args.source, range, &destination)
        .await
        .context("Extraction failed")?;

    if cli.json {
        print_json(&out)?;
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages ({} of {})  →  {}",
            green("✔"),
            out.pages_extracted,
            range,
            out.source_pages,
            bold(&out.output_path.display().to_string())
        );
    }
    Ok(())
}

async fn run_ocr(cli: &Cli, args: &OcrArgs, progress: Option<ProgressCallback>) -> Result<()> {
    let config = segment_config(&args.recognize, None, progress)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.pdf.with_extension("txt"));

    ensure_pdfium(cli.quiet)?;
    let tesseract = TesseractRecognizer::new(&config).await?;
    let pages = ocr_pdf_to_text(&args.pdf, &output, &config, &tesseract)
        .await
        .context("OCR failed")?;

    if cli.json {
        print_json(&serde_json::json!({ "pages": pages, "output_path": output }))?;
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  →  {}",
            green("✔"),
            pages,
            bold(&output.display().to_string())
        );
    }
    Ok(())
}

async fn run_segment(
    cli: &Cli,
    args: &SegmentArgs,
    progress: impl FnOnce() -> Option<ProgressCallback>,
) -> Result<()> {
    let (source, output) = resolve_paths(&args.source, &args.output, &args.hierarchy)?;
    let kind = resolve_source(&source)?;
    // A text dump has no OCR stage to report and needs neither pdfium nor
    // Tesseract.
    let result = match kind {
        SourceKind::Pdf(pdf) => {
            let config = segment_config(&args.recognize, Some(&args.split), progress())?;
            ensure_pdfium(cli.quiet)?;
            let tesseract = TesseractRecognizer::new(&config).await?;
            segment_pdf(&pdf, &config, &tesseract).await
        }
        SourceKind::Text(dump) => {
            let config = segment_config(&args.recognize, Some(&args.split), None)?;
            segment_text_file(&dump, &config).await
        }
    };
    let out = result.context("Segmentation failed")?;

    out.collection.save(&output).await?;
    report_segment(cli, &out.stats, &output)
}

async fn run_correct(cli: &Cli, args: &CorrectArgs, progress: Option<ProgressCallback>) -> Result<()> {
    let config = correction_config(&args.correction, progress).await?;
    let collection = RecordCollection::load(&args.input).await?;
    let corrector = build_corrector(&config).await?;

    let out = correct_collection(&collection, corrector.as_ref(), &config)
        .await
        .context("Correction failed")?;
    out.collection.save(&args.output).await?;
    report_correction(cli, &out.stats, &args.output)
}

async fn run_pipeline(cli: &Cli, args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<()> {
    let (pdf, output) = resolve_paths(&args.pdf, &args.output, &args.hierarchy)?;
    let seg_config = segment_config(&args.recognize, Some(&args.split), progress.clone())?;
    let cor_config = correction_config(&args.correction, progress).await?;

    // Every prerequisite is checked before the first page is rendered.
    ensure_pdfium(cli.quiet)?;
    let tesseract = TesseractRecognizer::new(&seg_config).await?;
    let corrector = build_corrector(&cor_config).await?;

    let segmented = segment_pdf(&pdf, &seg_config, &tesseract)
        .await
        .context("Segmentation failed")?;
    if args.keep_intermediate {
        let intermediate = intermediate_path(&output);
        segmented.collection.save(&intermediate).await?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "   {} uncorrected slokas  →  {}",
                segmented.stats.records,
                dim(&intermediate.display().to_string())
            );
        }
    }

    let corrected = correct_collection(&segmented.collection, corrector.as_ref(), &cor_config)
        .await
        .context("Correction failed")?;
    corrected.collection.save(&output).await?;

    if cli.json {
        print_json(&serde_json::json!({
            "segment": segmented.stats,
            "correction": corrected.stats,
            "output_path": output,
        }))?;
        return Ok(());
    }
    report_correction(cli, &corrected.stats, &output)
}

async fn run_probe(cli: &Cli, args: &ProbeArgs) -> Result<()> {
    let backend = args.service.backend()?;
    let candidates: Vec<String> = if !args.models.is_empty() {
        args.models.clone()
    } else {
        match args.service.backend {
            BackendArg::Vertex => VERTEX_CANDIDATE_MODELS.iter().map(|s| s.to_string()).collect(),
            BackendArg::Anthropic => ANTHROPIC_CANDIDATE_MODELS.iter().map(|s| s.to_string()).collect(),
            BackendArg::Provider => bail!("--backend provider needs an explicit --models list"),
        }
    };
    let config = CorrectionConfig::builder(backend)
        .api_timeout_secs(args.service.api_timeout)
        .build()?;

    let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
    let results = probe_models(&config, &refs).await?;

    if cli.json {
        return print_json(&results);
    }
    for r in &results {
        let status = match &r.status {
            ProbeStatus::Available => green("✓ available"),
            ProbeStatus::NotFound => dim("✗ not found"),
            ProbeStatus::PermissionDenied => red("✗ permission denied"),
            ProbeStatus::Failed(e) => red(&format!("✗ {e}")),
        };
        println!("  {:<34} {}", r.model, status);
    }
    match results.iter().find(|r| r.status == ProbeStatus::Available) {
        Some(r) => {
            println!("\nUse: --model {}", bold(&r.model));
            Ok(())
        }
        None => bail!("None of the {} candidate models is reachable", results.len()),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Source and YAML output from explicit paths or the kosha hierarchy.
fn resolve_paths(
    source: &Option<PathBuf>,
    output: &Option<PathBuf>,
    hierarchy: &HierarchyArgs,
) -> Result<(PathBuf, PathBuf)> {
    let kp = hierarchy.kosha_path();
    let source = match (source, &kp) {
        (Some(s), _) => s.clone(),
        (None, Some(kp)) => kp.pdf_path(),
        (None, None) => bail!("Give a source path or all of --kosha/--khanda/--file"),
    };
    let output = match (output, &kp) {
        (Some(o), _) => o.clone(),
        (None, Some(kp)) => kp.yaml_path(),
        (None, None) => bail!("Give --output or all of --kosha/--khanda/--file"),
    };
    Ok((source, output))
}

/// `<dir>/<stem>.ocr.yaml` next to the final output.
fn intermediate_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slokas".to_string());
    output.with_file_name(format!("{stem}.ocr.yaml"))
}

fn segment_config(
    recognize: &RecognizeArgs,
    split: Option<&SplitArgs>,
    progress: Option<ProgressCallback>,
) -> Result<SegmentConfig> {
    let mut builder = SegmentConfig::builder()
        .dpi(recognize.dpi)
        .language(&recognize.lang)
        .tesseract_cmd(&recognize.tesseract);
    if let Some(split) = split {
        builder = builder.min_record_chars(split.min_chars);
        if let Some(ref t) = split.title {
            builder = builder.title(t);
        }
        if let Some(ref k) = split.khanda_title {
            builder = builder.khanda(k);
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid OCR configuration")
}

async fn correction_config(args: &CorrectionArgs, progress: Option<ProgressCallback>) -> Result<CorrectionConfig> {
    let system_prompt = if let Some(ref path) = args.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = CorrectionConfig::builder(args.service.backend()?)
        .concurrency(args.concurrency)
        .max_retries(args.max_retries)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .api_timeout_secs(args.service.api_timeout);
    if let Some(ref m) = args.service.model {
        builder = builder.model(m);
    }
    if let Some(p) = system_prompt {
        builder = builder.system_prompt(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    Ok(builder.build()?)
}

fn report_segment(cli: &Cli, stats: &SegmentStats, output: &Path) -> Result<()> {
    if cli.json {
        return print_json(stats);
    }
    if !cli.quiet {
        eprintln!(
            "{}  {} slokas  {}  →  {}",
            green("✔"),
            stats.records,
            dim(&format!(
                "({} pages, {} discarded, {} duplicates)",
                stats.pages, stats.discarded, stats.duplicates
            )),
            bold(&output.display().to_string())
        );
    }
    Ok(())
}

fn report_correction(cli: &Cli, stats: &CorrectionStats, output: &Path) -> Result<()> {
    if cli.json {
        return print_json(stats);
    }
    if !cli.quiet {
        eprintln!(
            "{}  {}/{} corrected  {}  {}ms  →  {}",
            if stats.failed == 0 { green("✔") } else { cyan("⚠") },
            stats.corrected,
            stats.total,
            dim(&format!(
                "({} unchanged, {} failed, {} merged)",
                stats.unchanged, stats.failed, stats.merged
            )),
            stats.total_duration_ms,
            bold(&output.display().to_string())
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    );
    Ok(())
}

/// Make sure a pdfium library is available, downloading it on first run
/// (~30 MB, cached afterwards).
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_extract_with_hierarchy() {
        let cli = Cli::try_parse_from([
            "kosha", "extract", "book.pdf", "--start", "15", "--end", "16", "--kosha", "K", "--khanda",
            "Kh", "--file", "f.pdf",
        ])
        .unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(
            args.hierarchy.kosha_path().unwrap().pdf_path(),
            PathBuf::from("Input/K/Kh/f.pdf")
        );
    }

    #[test]
    fn intermediate_sits_next_to_output() {
        assert_eq!(
            intermediate_path(Path::new("Output/K/Kh/adhyaya.yaml")),
            PathBuf::from("Output/K/Kh/adhyaya.ocr.yaml")
        );
    }

    #[test]
    fn provider_backend_requires_name() {
        let cli = Cli::try_parse_from(["kosha", "probe", "--backend", "provider"]).unwrap();
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert!(args.service.backend().is_err());
    }
}
