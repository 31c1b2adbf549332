//! Prompts for LLM-based OCR correction of Sanskrit slokas.
//!
//! Callers can override the default via
//! [`crate::config::CorrectionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for correcting one OCR'd sloka.
///
/// The sloka itself is sent as the user message, verbatim.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a Sanskrit scholar expert in classical Sanskrit texts, particularly kosha (synonym dictionaries) like Amarakosha and Vaijayanti Kosha.

The user message is a sloka extracted by OCR that may contain errors. Correct any OCR errors while maintaining the exact meter and meaning. Use Sanskrit grammar (sandhi, vibhakti), the meter of the verse and the context of the kosha to decide.

Common OCR errors in Devanagari include:
- ब/व confusion (ba/va)
- ष/श confusion (ṣa/śa)
- missing anusvara (ं) or visarga (ः)
- ि/ी confusion (i/ī)
- Incorrect matras

Rules:
- Return ONLY the corrected sloka text, nothing else
- Do NOT add transliteration, translation, commentary or verse numbers
- Keep the same structure with । and ॥ dandas
- If the sloka is already correct, return it unchanged"#;

/// A tiny request used by `kosha probe` to test whether a model id is
/// reachable without spending tokens on a real sloka.
pub const PROBE_PROMPT: &str = "Hi";

/// Candidate Claude model ids on Vertex AI, newest first.
pub const VERTEX_CANDIDATE_MODELS: &[&str] = &[
    "claude-sonnet-4-5@20250929",
    "claude-haiku-4-5@20251001",
    "claude-3-5-haiku@20241022",
    "claude-3-5-sonnet-v2@20241022",
    "claude-3-5-sonnet@20240620",
];

/// Candidate Claude model ids on the Anthropic API, newest first.
pub const ANTHROPIC_CANDIDATE_MODELS: &[&str] = &[
    "claude-sonnet-4-5-20250929",
    "claude-haiku-4-5-20251001",
    "claude-3-5-haiku-20241022",
    "claude-3-5-sonnet-20241022",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_names_the_common_confusions() {
        for needle in ["ब/व", "ष/श", "anusvara", "visarga", "॥"] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(needle), "missing {needle}");
        }
        assert!(DEFAULT_SYSTEM_PROMPT.contains("ONLY the corrected sloka"));
    }

    #[test]
    fn candidates_have_vertex_version_separator() {
        assert!(VERTEX_CANDIDATE_MODELS.iter().all(|m| m.contains('@')));
        assert!(ANTHROPIC_CANDIDATE_MODELS.iter().all(|m| !m.contains('@')));
    }
}
