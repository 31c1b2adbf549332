//! Offline integration tests: segmentation and correction driven through the
//! public API with scripted correctors, no network or OCR engine needed.

use async_trait::async_trait;
use kosha_digitizer::{
    correct_collection, correct_file, extract_to_kosha, resolve_source, segment_text,
    segment_text_file,
    CorrectionBackend, CorrectionConfig, CorrectionError, Correction, Corrector, KoshaError,
    KoshaPath, PipelineProgressCallback, RecordCollection, RecordError, SegmentConfig, SourceKind,
    Stage,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn config() -> CorrectionConfig {
    CorrectionConfig::builder(CorrectionBackend::Anthropic {
        api_key: "test-key".into(),
    })
    .max_retries(0)
    .retry_backoff_ms(1)
    .build()
    .unwrap()
}

fn slokas(n: usize) -> RecordCollection {
    RecordCollection::from_texts((1..=n).map(|i| format!("देवाः सुराः श्लोकः {i} ॥")))
}

/// Prefixes every text with `शुद्ध`, except texts listed in `echo` (returned
/// as-is) and texts listed in `fail` (API error).
struct Scripted {
    echo: HashSet<String>,
    fail: HashSet<String>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new() -> Self {
        Self {
            echo: HashSet::new(),
            fail: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn fixed(text: &str) -> String {
        format!("शुद्ध {text}")
    }
}

#[async_trait]
impl Corrector for Scripted {
    async fn correct(&self, text: &str) -> Result<Correction, CorrectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(text) {
            return Err(CorrectionError::Api("HTTP 500: internal error".into()));
        }
        let reply = if self.echo.contains(text) {
            text.to_string()
        } else {
            Self::fixed(text)
        };
        Ok(Correction {
            text: reply,
            input_tokens: 40,
            output_tokens: 20,
        })
    }
}

struct Rejecting;

#[async_trait]
impl Corrector for Rejecting {
    async fn correct(&self, _text: &str) -> Result<Correction, CorrectionError> {
        Err(CorrectionError::Auth("HTTP 401: invalid x-api-key".into()))
    }
}

/// Answers later records sooner so completion order is the reverse of
/// input order.
struct Staggered;

#[async_trait]
impl Corrector for Staggered {
    async fn correct(&self, text: &str) -> Result<Correction, CorrectionError> {
        let n: u64 = text
            .split_whitespace()
            .find_map(|w| w.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(5 * (20 - n.min(20)))).await;
        Ok(Correction {
            text: format!("शुद्ध {text}"),
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.events.lock().unwrap().push(format!("start {stage} {total}"));
    }
    fn on_record_error(&self, index: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {index}"));
    }
    fn on_stage_complete(&self, stage: Stage, total: usize, success: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {stage} {success}/{total}"));
    }
}

// ── Correction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn chapter_of_65_with_two_echoes() {
    let input = slokas(65);
    let mut corrector = Scripted::new();
    let texts: Vec<String> = input.texts().map(String::from).collect();
    corrector.echo.insert(texts[9].clone());
    corrector.echo.insert(texts[40].clone());

    let out = correct_collection(&input, &corrector, &config()).await.unwrap();

    assert_eq!(out.collection.len(), 65);
    assert_eq!(out.stats.total, 65);
    assert_eq!(out.stats.corrected, 63);
    assert_eq!(out.stats.unchanged, 2);
    assert_eq!(out.stats.failed, 0);
    assert_eq!(corrector.calls.load(Ordering::SeqCst), 65);

    // Every record remembers its input text, and order follows the input.
    for (record, original) in out.collection.iter().zip(&texts) {
        assert_eq!(record.meta.original.as_deref(), Some(original.as_str()));
        let changed = record.meta.corrected == Some(true);
        if changed {
            assert_eq!(record.text, Scripted::fixed(original));
        } else {
            assert_eq!(&record.text, original);
        }
    }
    let unchanged: Vec<&str> = out
        .collection
        .iter()
        .filter(|r| r.meta.corrected == Some(false))
        .map(|r| r.text.as_str())
        .collect();
    assert_eq!(unchanged, vec![texts[9].as_str(), texts[40].as_str()]);
}

#[tokio::test]
async fn failed_records_keep_ocr_text() {
    let input = slokas(6);
    let texts: Vec<String> = input.texts().map(String::from).collect();
    let mut corrector = Scripted::new();
    corrector.fail.insert(texts[1].clone());
    corrector.fail.insert(texts[4].clone());

    let recorder = Arc::new(Recorder::default());
    let mut cfg = config();
    cfg.progress = Some(recorder.clone());

    let out = correct_collection(&input, &corrector, &cfg).await.unwrap();

    assert_eq!(out.collection.len(), 6);
    assert_eq!(out.stats.corrected, 4);
    assert_eq!(out.stats.failed, 2);

    let failed = out.collection.get(&texts[1]).expect("failed record kept");
    assert_eq!(failed.corrected, Some(false));
    assert_eq!(failed.original.as_deref(), Some(texts[1].as_str()));
    assert!(matches!(
        out.outcomes[4].error,
        Some(RecordError::CorrectionFailed { index: 5, .. })
    ));
    assert!(out.outcomes[0].error.is_none());

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start Correcting 6".to_string(),
            "error 2".to_string(),
            "error 5".to_string(),
            "done Correcting 4/6".to_string(),
        ]
    );
}

#[tokio::test]
async fn rejected_credentials_abort_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.yaml");
    let output = dir.path().join("out.yaml");
    slokas(3).save(&input).await.unwrap();

    let err = correct_file(&input, &output, &Rejecting, &config())
        .await
        .unwrap_err();

    assert!(matches!(err, KoshaError::AuthError { .. }), "got {err:?}");
    assert!(!output.exists());
}

#[tokio::test]
async fn order_survives_concurrency() {
    let input = slokas(12);
    let mut cfg = config();
    cfg.concurrency = 6;

    let out = correct_collection(&input, &Staggered, &cfg).await.unwrap();

    let originals: Vec<&str> = out
        .collection
        .iter()
        .map(|r| r.meta.original.as_deref().unwrap())
        .collect();
    let expected: Vec<&str> = input.texts().collect();
    assert_eq!(originals, expected);
    let indices: Vec<usize> = out.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn correct_file_writes_yaml_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Output/Vaijayanti_Kosha/1_SvargaKhanda/1_AdiDevaadhyaayah.yaml");
    slokas(3).save(&path).await.unwrap();

    let out = correct_file(&path, &path, &Scripted::new(), &config())
        .await
        .unwrap();
    assert_eq!(out.stats.corrected, 3);

    let yaml = std::fs::read_to_string(&path).unwrap();
    assert!(yaml.contains("corrected: true"));
    assert!(yaml.contains("original:"));
    assert!(yaml.contains("श्लोकः 1 ॥"));

    let reloaded = RecordCollection::load(&path).await.unwrap();
    assert_eq!(reloaded, out.collection);
    assert!(!path.with_extension("yaml.tmp").exists());
}

#[tokio::test]
async fn second_pass_with_echoing_service_keeps_keys() {
    let first = correct_collection(&slokas(5), &Scripted::new(), &config())
        .await
        .unwrap();

    let mut echo_all = Scripted::new();
    echo_all.echo = first.collection.texts().map(String::from).collect();
    let second = correct_collection(&first.collection, &echo_all, &config())
        .await
        .unwrap();

    let a: Vec<&str> = first.collection.texts().collect();
    let b: Vec<&str> = second.collection.texts().collect();
    assert_eq!(a, b);
    assert_eq!(second.stats.unchanged, 5);
}

// ── Segmentation ─────────────────────────────────────────────────────────────

const DUMP: &str = "--- Page 1 ---
वैजयन्तीकोषः
स्वर्गकाण्डः
आदिदेवाध्यायः
स्वर्गो नाकस्त्रिदिवस्त्रिदशालयः सुरलोकः ॥ १ ॥
अमरा निर्जरा देवास्त्रिदशा विबुधाः सुराः ॥ २ ॥

--- Page 2 ---
सुपर्वाणः सुमनसस्त्रिदिवेशा दिवौकसः ॥ ३ ॥
२१
आदितेया दिविषदो लेखा अदितिनन्दनाः
";

fn segment_config() -> SegmentConfig {
    SegmentConfig::builder()
        .title("आदिदेवाध्यायः")
        .khanda("स्वर्गकाण्डः")
        .build()
        .unwrap()
}

#[tokio::test]
async fn dump_segments_into_numbered_free_slokas() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("adideva.txt");
    std::fs::write(&dump, DUMP).unwrap();

    let out = segment_text_file(&dump, &segment_config()).await.unwrap();

    let texts: Vec<&str> = out.collection.texts().collect();
    assert_eq!(
        texts,
        vec![
            "स्वर्गो नाकस्त्रिदिवस्त्रिदशालयः सुरलोकः ॥",
            "अमरा निर्जरा देवास्त्रिदशा विबुधाः सुराः ॥",
            "सुपर्वाणः सुमनसस्त्रिदिवेशा दिवौकसः ॥",
        ]
    );
    assert_eq!(out.stats.pages, 2);
    for text in texts {
        assert!(!text.chars().any(|c| c.is_ascii_digit()), "{text}");
        assert!(!text.contains("--- Page"));
    }
    assert!(out.collection.iter().all(|r| r.meta.is_empty()));
}

#[tokio::test]
async fn dump_is_sniffed_as_text_and_pdf_magic_as_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("adideva.txt");
    let pdf = dir.path().join("adideva.pdf");
    std::fs::write(&dump, DUMP).unwrap();
    std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();

    assert_eq!(resolve_source(&pdf).unwrap(), SourceKind::Pdf(pdf.clone()));
    let SourceKind::Text(path) = resolve_source(&dump).unwrap() else {
        panic!("text dump sniffed as PDF");
    };
    let out = segment_text_file(&path, &segment_config()).await.unwrap();
    assert_eq!(out.collection.len(), 3);
}

#[test]
fn segmentation_is_deterministic() {
    let a = segment_text(DUMP, &segment_config());
    let b = segment_text(DUMP, &segment_config());
    assert_eq!(a.collection, b.collection);
    assert_eq!(
        a.collection.to_yaml().unwrap(),
        b.collection.to_yaml().unwrap()
    );
}

#[tokio::test]
async fn segment_then_correct_then_reload() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = dir.path().join("chapter.yaml");
    let seg = segment_text(DUMP, &segment_config());
    seg.collection.save(&yaml).await.unwrap();

    let out = correct_file(&yaml, &yaml, &Scripted::new(), &config())
        .await
        .unwrap();
    assert_eq!(out.stats.corrected, seg.collection.len());

    let reloaded = RecordCollection::load(&yaml).await.unwrap();
    let originals: Vec<&str> = reloaded
        .iter()
        .map(|r| r.meta.original.as_deref().unwrap())
        .collect();
    let segmented: Vec<&str> = seg.collection.texts().collect();
    assert_eq!(originals, segmented);
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reversed_range_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let kp = KoshaPath::new("Vaijayanti_Kosha", "1_SvargaKhanda", "1_AdiDevaadhyaayah.pdf")
        .with_roots(dir.path().join("Input"), dir.path().join("Output"));

    let err = extract_to_kosha(dir.path().join("book.pdf"), 20, 10, &kp)
        .await
        .unwrap_err();

    assert!(matches!(err, KoshaError::InvalidPageRange { start: 20, end: 10 }));
    assert!(!kp.pdf_path().exists());
    assert!(!dir.path().join("Input").exists());
}

// ── Record files ─────────────────────────────────────────────────────────────

#[test]
fn empty_record_file_is_empty_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    std::fs::write(&path, "").unwrap();

    let loaded = tokio_test::block_on(RecordCollection::load(&path));
    let collection = tokio_test::assert_ok!(loaded);
    assert!(collection.is_empty());
}

#[test]
fn malformed_record_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "- just\n- a list\n").unwrap();

    let err = tokio_test::assert_err!(tokio_test::block_on(RecordCollection::load(&path)));
    assert!(matches!(err, KoshaError::InvalidRecordFile { .. }), "got {err:?}");
}
