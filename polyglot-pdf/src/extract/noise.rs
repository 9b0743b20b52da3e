//! Noise rejection for extraction artifacts.
//!
//! Scanned and generated PDFs both shed tiny punctuation-only fragments
//! (ruling dots, hyphenation debris, broken ligatures). Anything carrying an
//! alphanumeric character is kept unconditionally.

use crate::model::{TextFragment, clean_text};

/// Non-alphanumeric fragments up to this many characters are artifacts
/// unless their box is tall enough relative to the font size.
const SHORT_ARTIFACT_MAX_CHARS: usize = 2;

/// Minimum box height for short punctuation fragments, as a multiple of
/// font size.
const SHORT_ARTIFACT_MIN_HEIGHT_FACTOR: f32 = 0.25;

/// Longer strings of isolated non-alphanumeric tokens face stricter
/// geometry checks.
const LONG_ARTIFACT_MIN_HEIGHT_FACTOR: f32 = 0.45;
const LONG_ARTIFACT_MIN_WIDTH_PER_CHAR_FACTOR: f32 = 0.2;

pub fn is_noise(fragment: &TextFragment) -> bool {
    let cleaned = clean_text(&fragment.text);
    if cleaned.is_empty() {
        return true;
    }
    if cleaned.chars().any(char::is_alphanumeric) {
        return false;
    }

    let font_size = fragment.style.font_size.max(1.0);
    let char_count = cleaned.chars().filter(|c| !c.is_whitespace()).count();

    if char_count <= SHORT_ARTIFACT_MAX_CHARS {
        fragment.bbox.height < SHORT_ARTIFACT_MIN_HEIGHT_FACTOR * font_size
    } else {
        fragment.bbox.height < LONG_ARTIFACT_MIN_HEIGHT_FACTOR * font_size
            || fragment.bbox.width
                < LONG_ARTIFACT_MIN_WIDTH_PER_CHAR_FACTOR * font_size * char_count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, StyleInfo};

    fn fragment(text: &str, width: f32, height: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, width, height),
            style: StyleInfo {
                font_name: "Helvetica".to_string(),
                font_size: 12.0,
                color: [0.0, 0.0, 0.0],
                bold: false,
                italic: false,
            },
            invisible: false,
        }
    }

    #[test]
    fn test_whitespace_only_is_noise() {
        assert!(is_noise(&fragment("   \t", 10.0, 10.0)));
    }

    #[test]
    fn test_alphanumeric_always_kept() {
        assert!(!is_noise(&fragment("a", 2.0, 1.0)));
        assert!(!is_noise(&fragment("1.", 2.0, 1.0)));
    }

    #[test]
    fn test_tiny_punctuation_dropped() {
        // 12pt font, box barely 1pt tall: a ruling artifact.
        assert!(is_noise(&fragment(".", 2.0, 1.0)));
    }

    #[test]
    fn test_normal_punctuation_kept() {
        // A dash at sensible glyph height survives.
        assert!(!is_noise(&fragment("—", 10.0, 8.0)));
    }

    #[test]
    fn test_long_punctuation_run_needs_width() {
        // Six dots squeezed into 3pt of width: leader-line debris.
        assert!(is_noise(&fragment("......", 3.0, 8.0)));
        // The same dots at plausible width survive.
        assert!(!is_noise(&fragment("......", 20.0, 8.0)));
    }
}
