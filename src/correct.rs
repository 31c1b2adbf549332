//! AI Corrector: send every record of a sloka file to a correction service
//! and write the corrected collection.
//!
//! ## Outcome policy
//!
//! | Reply (after normalisation)      | Key written   | `corrected` |
//! |----------------------------------|---------------|-------------|
//! | non-empty and different          | reply         | `true`      |
//! | identical or empty               | original      | `false`     |
//! | failed after retries             | original      | `false`     |
//!
//! `original` is always the input text. A corrected key that already exists
//! (two OCR variants corrected to the same verse) falls back to the original
//! key; if that is taken too the record is dropped and counted as merged.
//!
//! Per-record failures never abort the batch. Rejected credentials and
//! unknown models do, since every following request would fail the same way.
//!
//! ## Ordering
//!
//! Records go through `futures::StreamExt::buffered`, which runs up to
//! `concurrency` requests at once but yields results in input order, so the
//! output file always follows the input file.

use crate::config::{CorrectionBackend, CorrectionConfig};
use crate::error::{CorrectionError, KoshaError, RecordError};
use crate::output::{CorrectionOutput, CorrectionStats, RecordOutcome};
use crate::pipeline::llm::{build_corrector, correct_with_retry, Corrector, VertexCredentials};
use crate::pipeline::postprocess::normalise_correction;
use crate::progress::Stage;
use crate::prompts::PROBE_PROMPT;
use crate::record::{RecordCollection, RecordMeta};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Correct every record of `collection`.
///
/// # Returns
/// `Ok(CorrectionOutput)` even if some records failed (check
/// `output.stats.failed` and each outcome's `error`).
///
/// # Errors
/// - [`KoshaError::AuthError`] when the service rejects the credentials
/// - [`KoshaError::ProviderNotConfigured`] when the model does not exist
pub async fn correct_collection(
    collection: &RecordCollection,
    corrector: &dyn Corrector,
    config: &CorrectionConfig,
) -> Result<CorrectionOutput, KoshaError> {
    let start = Instant::now();
    let total = collection.len();
    info!(
        "Correcting {} records with {} (model {}, concurrency {})",
        total,
        corrector.name(),
        config.effective_model(),
        config.concurrency
    );

    if let Some(ref cb) = config.progress {
        cb.on_stage_start(Stage::Correction, total);
    }

    let inputs: Vec<(usize, String)> = collection
        .texts()
        .enumerate()
        .map(|(i, t)| (i + 1, t.to_string()))
        .collect();

    let mut results = stream::iter(inputs)
        .map(move |(index, text)| async move {
            if let Some(ref cb) = config.progress {
                cb.on_record_start(index, total);
            }
            let record_start = Instant::now();
            let attempted = correct_with_retry(corrector, index, &text, config).await;
            let duration_ms = record_start.elapsed().as_millis() as u64;
            (index, text, attempted, duration_ms)
        })
        .buffered(config.concurrency.max(1));

    let mut output = RecordCollection::new();
    let mut outcomes = Vec::with_capacity(total);

    while let Some((index, original, attempted, duration_ms)) = results.next().await {
        let mut outcome = RecordOutcome {
            index,
            original: original.clone(),
            text: original.clone(),
            corrected: false,
            retries: attempted.retries,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            error: None,
        };

        let candidate = match attempted.result {
            Ok(correction) => {
                outcome.input_tokens = correction.input_tokens;
                outcome.output_tokens = correction.output_tokens;
                Some(normalise_correction(&correction.text))
            }
            Err(CorrectionError::Auth(detail)) => {
                return Err(KoshaError::AuthError {
                    provider: corrector.name().to_string(),
                    detail,
                });
            }
            Err(CorrectionError::ModelNotFound(detail)) => {
                return Err(KoshaError::ProviderNotConfigured {
                    provider: corrector.name().to_string(),
                    hint: format!(
                        "Model '{}' is not available: {detail}\nRun `kosha probe` to find a model id that works.",
                        config.effective_model()
                    ),
                });
            }
            Err(e) => {
                let detail = e.to_string();
                warn!("Record {}: correction failed, keeping OCR text — {}", index, detail);
                if let Some(ref cb) = config.progress {
                    cb.on_record_error(index, total, &detail);
                }
                outcome.error = Some(RecordError::CorrectionFailed {
                    index,
                    retries: attempted.retries,
                    detail,
                });
                None
            }
        };

        place_record(&mut output, &mut outcome, candidate);

        if let Some(ref cb) = config.progress {
            cb.on_record_complete(index, total, outcome.corrected);
        }
        outcomes.push(outcome);
    }

    let stats = CorrectionStats::from_outcomes(&outcomes, start.elapsed().as_millis() as u64);
    if let Some(ref cb) = config.progress {
        cb.on_stage_complete(Stage::Correction, total, stats.corrected);
    }
    info!(
        "Correction complete: {}/{} corrected, {} unchanged, {} failed, {} merged, {}ms",
        stats.corrected, stats.total, stats.unchanged, stats.failed, stats.merged, stats.total_duration_ms
    );

    Ok(CorrectionOutput {
        collection: output,
        outcomes,
        stats,
    })
}

/// Insert one record into the output according to the outcome policy and
/// fill in `outcome.text` / `outcome.corrected`.
fn place_record(output: &mut RecordCollection, outcome: &mut RecordOutcome, candidate: Option<String>) {
    let original = outcome.original.clone();

    if let Some(corrected) = candidate.filter(|c| !c.is_empty() && *c != original) {
        if output.insert(corrected.clone(), RecordMeta::corrected_from(&original)) {
            debug!("Record {}: corrected", outcome.index);
            outcome.text = corrected;
            outcome.corrected = true;
            return;
        }
        warn!(
            "Record {}: corrected text already present, keeping original key",
            outcome.index
        );
    }

    if output.insert(original.clone(), RecordMeta::unchanged(&original)) {
        outcome.text = original;
        outcome.corrected = false;
    } else {
        warn!("Record {}: duplicate of an existing entry, dropped", outcome.index);
        outcome.corrected = false;
        outcome.error = Some(RecordError::Merged {
            index: outcome.index,
        });
    }
}

/// Load `input`, correct it, and write the result to `output` atomically.
pub async fn correct_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    corrector: &dyn Corrector,
    config: &CorrectionConfig,
) -> Result<CorrectionOutput, KoshaError> {
    let collection = RecordCollection::load(input.as_ref()).await?;
    let result = correct_collection(&collection, corrector, config).await?;
    result.collection.save(output.as_ref()).await?;
    Ok(result)
}

// ── Model probing ────────────────────────────────────────────────────────

/// What happened when a candidate model id was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Available,
    NotFound,
    PermissionDenied,
    Failed(String),
}

/// One probed model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub model: String,
    pub status: ProbeStatus,
}

/// Try `candidates` in order with a tiny prompt, stopping at the first
/// model that answers. `make` builds a corrector for one model id.
pub async fn probe_candidates<F>(candidates: &[&str], mut make: F) -> Result<Vec<ProbeResult>, KoshaError>
where
    F: FnMut(&str) -> Result<Arc<dyn Corrector>, KoshaError>,
{
    let mut results = Vec::with_capacity(candidates.len());
    for &model in candidates {
        let corrector = make(model)?;
        let status = match corrector.correct(PROBE_PROMPT).await {
            Ok(_) => ProbeStatus::Available,
            Err(CorrectionError::ModelNotFound(_)) => ProbeStatus::NotFound,
            Err(CorrectionError::Auth(_)) => ProbeStatus::PermissionDenied,
            Err(e) => ProbeStatus::Failed(e.to_string()),
        };
        debug!("Probe {}: {:?}", model, status);
        let found = status == ProbeStatus::Available;
        results.push(ProbeResult {
            model: model.to_string(),
            status,
        });
        if found {
            break;
        }
    }
    Ok(results)
}

/// Probe `candidates` against the backend in `config`. Vertex credentials
/// are resolved once for all candidates.
pub async fn probe_models(config: &CorrectionConfig, candidates: &[&str]) -> Result<Vec<ProbeResult>, KoshaError> {
    let mut base = config.clone();
    base.max_retries = 0;
    if let CorrectionBackend::Vertex {
        ref mut access_token,
        ..
    } = base.backend
    {
        let token = VertexCredentials::access_token(access_token.as_deref()).await?;
        *access_token = Some(token);
    }

    let mut correctors = Vec::with_capacity(candidates.len());
    for &model in candidates {
        let mut c = base.clone();
        c.model = Some(model.to_string());
        correctors.push(build_corrector(&c).await?);
    }

    let mut prepared = correctors.into_iter();
    probe_candidates(candidates, move |model| {
        prepared
            .next()
            .ok_or_else(|| KoshaError::Internal(format!("no corrector prepared for {model}")))
    })
    .await
}
