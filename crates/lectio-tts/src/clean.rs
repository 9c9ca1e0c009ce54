//! Narration text preparation for synthesis.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker inserted between segments in whole-section synthesis; the TTS
/// prompt renders it as a deliberate breath pause that silence detection
/// can find again.
pub const PAUSE_MARKER: &str = "[pause]";

static MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*_`#>\[\]]+").expect("valid regex"));
static STAGE_DIRECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:pause|beat|slowly|emphasis)[^)]*\)").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip markup and stage directions the model sometimes leaves in
/// narration text, collapsing whitespace.
pub fn clean_narration_for_tts(text: &str) -> String {
    let no_directions = STAGE_DIRECTION_RE.replace_all(text, " ");
    let no_markup = MARKUP_RE.replace_all(&no_directions, "");
    WHITESPACE_RE.replace_all(&no_markup, " ").trim().to_string()
}

/// Join cleaned segment texts with pause markers for one whole-section
/// synthesis call.
pub fn join_segments_with_pauses(texts: &[String]) -> String {
    texts
        .iter()
        .map(|t| clean_narration_for_tts(t))
        .collect::<Vec<_>>()
        .join(&format!(" {PAUSE_MARKER} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_markup() {
        assert_eq!(
            clean_narration_for_tts("The **derivative** of `f`"),
            "The derivative of f"
        );
    }

    #[test]
    fn test_clean_strips_stage_directions() {
        assert_eq!(
            clean_narration_for_tts("First point. (pause for effect) Second point."),
            "First point. Second point."
        );
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean_narration_for_tts("a   b\n\nc"), "a b c");
    }

    #[test]
    fn test_join_inserts_n_minus_one_markers() {
        let texts = vec!["One.".to_string(), "Two.".to_string(), "Three.".to_string()];
        let joined = join_segments_with_pauses(&texts);
        assert_eq!(joined.matches(PAUSE_MARKER).count(), 2);
        assert!(joined.starts_with("One."));
        assert!(joined.ends_with("Three."));
    }
}
