//! Font-size fitting and line wrapping against a fixed box.
//!
//! Width measurement uses the Adobe core-font metrics for the Helvetica
//! family (the faces reconstruction draws with), so the fitting search is
//! pure arithmetic and independent of any PDF backend.

use crate::config::RenderConfig;
use crate::geometry::StyleInfo;

/// Helvetica regular advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, // 'a'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Helvetica bold advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, // 'a'..'z'
    389, 280, 389, 584, // '{'..'~'
];

/// Fallback width for characters outside the ASCII table.
const DEFAULT_WIDTH: u16 = 556;
const DEFAULT_WIDTH_BOLD: u16 = 611;

/// Result of the downward fitting search.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub font_size: f32,
    pub lines: Vec<String>,
}

/// Advance width of `text` at `font_size`, in points.
pub fn string_width(text: &str, font_size: f32, bold: bool) -> f32 {
    let (table, fallback) = if bold {
        (&HELVETICA_BOLD_WIDTHS, DEFAULT_WIDTH_BOLD)
    } else {
        (&HELVETICA_WIDTHS, DEFAULT_WIDTH)
    };
    let em_units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (32..=126).contains(&code) {
                table[(code - 32) as usize] as u32
            } else {
                fallback as u32
            }
        })
        .sum();
    em_units as f32 * font_size / 1000.0
}

/// Greedy word wrap against `max_width`. Words wider than the box are
/// hard-broken character by character.
pub fn wrap_text(text: &str, max_width: f32, font_size: f32, bold: bool) -> Vec<String> {
    let space_width = string_width(" ", font_size, bold);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0f32;

    for word in text.split_whitespace() {
        let word_width = string_width(word, font_size, bold);

        if word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            for c in word.chars() {
                let char_width = string_width(c.encode_utf8(&mut [0u8; 4]), font_size, bold);
                if current_width + char_width > max_width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0.0;
                }
                current.push(c);
                current_width += char_width;
            }
            continue;
        }

        if current.is_empty() {
            current = word.to_string();
            current_width = word_width;
        } else if current_width + space_width + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += space_width + word_width;
        } else {
            lines.push(current);
            current = word.to_string();
            current_width = word_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Search downward from the style's requested size in fixed decrements until
/// the wrapped text fits the box height, stopping at the configured minimum.
/// Greedy best-effort: if nothing fits, the minimum size is used anyway.
pub fn fit_text(
    text: &str,
    box_width: f32,
    box_height: f32,
    style: &StyleInfo,
    config: &RenderConfig,
) -> FitResult {
    let mut font_size = style.font_size.max(config.min_font_size);

    if config.fixed_font_size {
        return FitResult {
            lines: wrap_text(text, box_width, font_size, style.bold),
            font_size,
        };
    }

    loop {
        let lines = wrap_text(text, box_width, font_size, style.bold);
        let text_height = lines.len() as f32 * font_size * config.line_height_factor;
        if text_height <= box_height || font_size <= config.min_font_size {
            return FitResult { lines, font_size };
        }
        font_size = (font_size - config.font_size_step).max(config.min_font_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(size: f32) -> StyleInfo {
        StyleInfo {
            font_name: "Helvetica".to_string(),
            font_size: size,
            color: [0.0, 0.0, 0.0],
            bold: false,
            italic: false,
        }
    }

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn test_string_width_known_values() {
        // "Hi" = H (722) + i (222) = 944/1000 em.
        let w = string_width("Hi", 10.0, false);
        assert!((w - 9.44).abs() < 1e-3);
        // Bold is wider.
        assert!(string_width("Hi", 10.0, true) > w);
    }

    #[test]
    fn test_wrap_preserves_words() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 80.0, 12.0, false);
        assert!(lines.len() > 1);
        assert_eq!(
            lines.join(" "),
            "the quick brown fox jumps over the lazy dog"
        );
        // Every line respects the width.
        for line in &lines {
            assert!(string_width(line, 12.0, false) <= 80.0);
        }
    }

    #[test]
    fn test_wrap_hard_breaks_overlong_word() {
        let lines = wrap_text("Unverhältnismäßigkeit", 30.0, 12.0, false);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "Unverhältnismäßigkeit");
    }

    #[test]
    fn test_wrap_empty_text() {
        let lines = wrap_text("", 100.0, 12.0, false);
        assert_eq!(lines, vec![String::new()]);
    }

    #[test]
    fn test_fit_keeps_size_when_text_fits() {
        let result = fit_text("short", 200.0, 50.0, &style(12.0), &config());
        assert_eq!(result.font_size, 12.0);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn test_fit_shrinks_until_it_fits() {
        let text = "a considerably longer piece of translated text that cannot \
                    possibly fit the original box at the original font size";
        let result = fit_text(text, 120.0, 40.0, &style(14.0), &config());
        assert!(result.font_size < 14.0);
        assert!(result.font_size >= config().min_font_size);
        let height = result.lines.len() as f32 * result.font_size * config().line_height_factor;
        assert!(height <= 40.0, "fitted text must fit the box height");
    }

    #[test]
    fn test_fit_converges_to_minimum_on_impossible_box() {
        let text = "far too much text for a box this small ".repeat(20);
        let result = fit_text(&text, 50.0, 10.0, &style(12.0), &config());
        assert_eq!(result.font_size, config().min_font_size);
    }

    #[test]
    fn test_fit_never_overflows_when_box_allows_minimum() {
        // Box tall enough for the text at minimum size: the search must
        // return a size >= minimum whose wrapped lines fit.
        let text = "five words of sample text";
        let cfg = config();
        let result = fit_text(text, 60.0, 200.0, &style(30.0), &cfg);
        assert!(result.font_size >= cfg.min_font_size);
        let height = result.lines.len() as f32 * result.font_size * cfg.line_height_factor;
        assert!(height <= 200.0);
    }

    #[test]
    fn test_fixed_font_size_skips_search() {
        let cfg = RenderConfig {
            fixed_font_size: true,
            ..config()
        };
        let text = "text that would normally trigger shrinking ".repeat(10);
        let result = fit_text(&text, 50.0, 10.0, &style(12.0), &cfg);
        assert_eq!(result.font_size, 12.0);
    }
}
