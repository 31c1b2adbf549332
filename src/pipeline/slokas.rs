//! Sloka segmentation: raw OCR text → ordered list of sloka strings.
//!
//! Kosha pages set each verse over two or more lines and close it with a
//! double danda, usually followed by the verse number (`॥ १२ ॥`, `॥१२॥`,
//! `। १२ ।`). Running heads repeat the kosha, khanda and adhyaya names.
//!
//! Rules run in a fixed order:
//!
//! | Step | What | Example |
//! |------|------|---------|
//! | 1 | skip blank lines, `---` page markers, running heads, non-Devanagari lines | `--- Page 3 ---` |
//! | 2 | strip a leading `N→` line-number prefix | `12→अमरा …` |
//! | 3 | `।।` → `॥` | `सुराः ।।` |
//! | 4 | trailing `॥ N ॥` / `॥ N` → `॥` | `सुराः ॥ ७ ॥` |
//! | 5 | `N ।` / `N ॥` anywhere → `॥` | `सुराः ७॥` |
//!
//! Number patterns absorb whole runs (`१ २ ३ ॥`), since OCR often splits a
//! verse number or picks up a page number next to it.
//! | 6 | every `॥` closes a record; the rest of the line starts the next | |
//!
//! A closed record then has its whitespace collapsed, leftover digits next
//! to dandas removed, and is kept only if it is longer than
//! `min_record_chars` characters. Text after the final `॥` of the document never closes
//! and is dropped.

use crate::config::SegmentConfig;
use once_cell::sync::Lazy;
use regex::Regex;

const DOUBLE_DANDA: char = '॥';

static DEVANAGARI: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ऀ-ॿ]").unwrap());

static LINE_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+→").unwrap());

/// `॥ १२ ॥` / `। १२ ।` at end of line.
static ENCLOSED_NUMBER_AT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[।॥](?:\s*\d+)+\s*[।॥]\s*$").unwrap());

/// `॥ १२` at end of line (closing danda lost by OCR).
static OPEN_NUMBER_AT_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[।॥](?:\s*\d+)+\s*$").unwrap());

/// `१२ ॥` / `१२।` anywhere.
static NUMBER_BEFORE_DANDA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\d+\s*)+[।॥]").unwrap());

/// Leftover number glued to a danda after records are joined.
static NUMBER_AFTER_DANDA: Lazy<Regex> = Lazy::new(|| Regex::new(r"([।॥])(?:\s*\d+)+").unwrap());

static MULTI_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\s*\d+)+\s*॥").unwrap());

/// Result of segmenting one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmented {
    /// Sloka texts in document order. May contain repeats; deduplication is
    /// the caller's job.
    pub slokas: Vec<String>,
    /// Closed records dropped for being empty or shorter than the minimum.
    pub discarded: usize,
}

/// Split raw OCR text into slokas.
pub fn split_slokas(text: &str, config: &SegmentConfig) -> Segmented {
    let skip = config.skip_fragments();
    let mut out = Segmented::default();
    let mut pending = String::new();

    for raw in text.lines() {
        let Some(line) = clean_line(raw, &skip) else {
            continue;
        };

        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(&line);

        while let Some(pos) = pending.find(DOUBLE_DANDA) {
            let split_at = pos + DOUBLE_DANDA.len_utf8();
            let rest = pending.split_off(split_at);
            match finish_record(&pending, config.min_record_chars) {
                Some(sloka) => out.slokas.push(sloka),
                None => out.discarded += 1,
            }
            pending = rest.trim_start().to_string();
        }
    }

    if !pending.trim().is_empty() {
        tracing::debug!(
            "Dropping unterminated trailing text ({} chars)",
            pending.chars().count()
        );
    }

    out
}

/// Steps 1–5 for one line. `None` means the line is skipped.
fn clean_line(raw: &str, skip: &[&str]) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with("---") {
        return None;
    }
    if skip.iter().any(|frag| line.contains(frag)) {
        return None;
    }
    if !DEVANAGARI.is_match(line) {
        return None;
    }

    let line = LINE_NUMBER_PREFIX.replace(line, "");
    let line = line.replace("।।", "॥");
    let line = ENCLOSED_NUMBER_AT_END.replace(&line, "॥");
    let line = OPEN_NUMBER_AT_END.replace(&line, "॥");
    let line = NUMBER_BEFORE_DANDA.replace_all(&line, "॥");
    let line = line.trim();

    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Normalise a closed record, or `None` unless it is longer than
/// `min_chars`.
fn finish_record(raw: &str, min_chars: usize) -> Option<String> {
    let s = MULTI_WHITESPACE.replace_all(raw.trim(), " ");
    let s = TRAILING_NUMBER.replace_all(&s, "॥");
    let s = NUMBER_AFTER_DANDA.replace_all(&s, "$1");
    let s = MULTI_WHITESPACE.replace_all(s.trim(), " ");
    let s = s.trim();

    // A record that is only dandas carries no text.
    if s.chars().all(|c| c == '॥' || c == '।' || c.is_whitespace()) {
        return None;
    }
    if s.chars().count() <= min_chars {
        return None;
    }
    Some(s.to_string())
}
