//! Text recognition: rendered page image → raw Devanagari text.
//!
//! The segmenter only depends on the [`TextRecognizer`] trait, so tests can
//! feed canned page text and alternative engines can be dropped in without
//! touching segmentation.
//!
//! [`TesseractRecognizer`] drives the `tesseract` CLI: each page is written
//! as a PNG into a private temp directory and recognised with
//! `tesseract page.png stdout -l <lang> --dpi <dpi>`.

use crate::config::SegmentConfig;
use crate::error::KoshaError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Turns one page image into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognise page `page_num` (1-based, for error messages).
    async fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, KoshaError>;
}

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    language: String,
    dpi: u32,
}

impl TesseractRecognizer {
    /// Check that the binary runs and the configured language is installed.
    ///
    /// Fails with [`KoshaError::OcrEngineUnavailable`] or
    /// [`KoshaError::LanguageDataMissing`] before any page is rendered.
    pub async fn new(config: &SegmentConfig) -> Result<Self, KoshaError> {
        let output = Command::new(&config.tesseract_cmd)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| KoshaError::OcrEngineUnavailable {
                command: config.tesseract_cmd.clone(),
                detail: e.to_string(),
            })?;

        let installed = parse_lang_list(&output);
        // `san+eng` style specs need every component installed.
        for lang in config.language.split('+') {
            if !installed.iter().any(|l| l == lang) {
                return Err(KoshaError::LanguageDataMissing {
                    language: lang.to_string(),
                    installed: if installed.is_empty() {
                        "(none)".to_string()
                    } else {
                        installed.join(", ")
                    },
                });
            }
        }
        debug!(
            "tesseract '{}' ready, languages: {}",
            config.tesseract_cmd,
            installed.join(", ")
        );

        Ok(Self {
            command: config.tesseract_cmd.clone(),
            language: config.language.clone(),
            dpi: config.dpi,
        })
    }
}

/// Languages from `tesseract --list-langs`. Older releases print the list on
/// stderr, so both streams are scanned; the header line is skipped.
fn parse_lang_list(output: &Output) -> Vec<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages") && !l.contains(' '))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    #[instrument(level = "debug", skip_all, fields(page = page_num))]
    async fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, KoshaError> {
        let ocr_err = |detail: String| KoshaError::OcrFailed {
            page: page_num,
            detail,
        };

        let png = encode_png(image, page_num)?;
        let tmpdir = tempfile::TempDir::with_prefix("kosha-ocr").map_err(|e| ocr_err(e.to_string()))?;
        let input_path = tmpdir.path().join("page.png");
        tokio::fs::write(&input_path, &png)
            .await
            .map_err(|e| ocr_err(format!("cannot write tesseract input file: {e}")))?;

        let output = Command::new(&self.command)
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .output()
            .await
            .map_err(|e| KoshaError::OcrEngineUnavailable {
                command: self.command.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ocr_err(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("Page {} → {} chars", page_num, text.chars().count());
        Ok(text)
    }
}
