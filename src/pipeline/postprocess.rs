//! Post-processing: deterministic cleanup of a corrector's reply.
//!
//! Even with "return ONLY the corrected sloka" in the prompt, chat models
//! occasionally wrap the answer in a code fence, quote it, prefix it with
//! "Corrected sloka:", or reflow it over two lines the way the verse is
//! printed. A record key must be a single line, so the reply is normalised
//! before it is compared against the input.
//!
//! ## Rule Order
//!
//! Fences come off before prefixes and quotes so `"```\nCorrected: …\n```"`
//! unwraps fully; line endings are folded before whitespace is collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw reply.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Strip a leading "Corrected sloka:" style label
/// 3. Strip matching outer quotes
/// 4. Fold line breaks (CRLF, CR, LF) into spaces
/// 5. Strip invisible Unicode (zero-width space, BOM, soft hyphen, word joiner)
/// 6. `।।` → `॥`
/// 7. Collapse runs of whitespace and trim
///
/// An empty result means the service returned nothing usable.
pub fn normalise_correction(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = strip_label(&s);
    let s = strip_quotes(&s);
    let s = fold_line_breaks(&s);
    let s = remove_invisible_chars(&s);
    let s = normalise_double_danda(&s);
    collapse_whitespace(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n?```$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Strip answer labels ──────────────────────────────────────────────

static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:\*\*)?(?:corrected(?:\s+(?:sloka|shloka|text|version))?|sloka|shloka|output|answer)(?:\*\*)?\s*:\s*(?:\*\*)?\s*")
        .unwrap()
});

fn strip_label(input: &str) -> String {
    RE_LABEL.replace(input, "").into_owned()
}

// ── Rule 3: Strip matching outer quotes ──────────────────────────────────────

fn strip_quotes(input: &str) -> String {
    let t = input.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’'), ('`', '`')] {
        if t.chars().count() >= 2 && t.starts_with(open) && t.ends_with(close) {
            let inner = &t[open.len_utf8()..t.len() - close.len_utf8()];
            return inner.trim().to_string();
        }
    }
    t.to_string()
}

// ── Rule 4: Fold line breaks ─────────────────────────────────────────────────

fn fold_line_breaks(input: &str) -> String {
    input.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────
//
// ZWJ/ZWNJ are left alone: in Devanagari they select half-forms and are part
// of the text.

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

// ── Rule 6: Normalise double danda ───────────────────────────────────────────

static RE_TWO_DANDAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"।\s*।").unwrap());

fn normalise_double_danda(input: &str) -> String {
    RE_TWO_DANDAS.replace_all(input, "॥").into_owned()
}

// ── Rule 7: Collapse whitespace ──────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input.trim(), " ").into_owned()
}
