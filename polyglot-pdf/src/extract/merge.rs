//! Fragment merging: fragments into lines, lines into paragraphs.

use crate::geometry::{BoundingBox, StyleInfo};
use crate::model::TextFragment;

/// Vertical-center alignment tolerance for joining fragments into a line,
/// as a multiple of font size.
const VERTICAL_CENTER_FACTOR: f32 = 0.45;

/// Maximum horizontal gap between joined fragments, as a multiple of font
/// size.
const HORIZONTAL_GAP_FACTOR: f32 = 1.4;

/// Widened gap when either side comes from an invisible text layer; OCR
/// geometry is noisier.
const HORIZONTAL_GAP_FACTOR_INVISIBLE: f32 = 2.2;

/// How far fragments may overlap horizontally and still join, as a multiple
/// of font size.
const HORIZONTAL_OVERLAP_FACTOR: f32 = 0.5;

/// Paragraph join: maximum vertical gap between consecutive lines.
const PARAGRAPH_GAP_FACTOR: f32 = 1.6;

/// Paragraph join: maximum difference in line start X.
const PARAGRAPH_INDENT_FACTOR: f32 = 2.0;

/// How many trailing open lines a fragment is checked against. Interleaved
/// columns can push a line's fragments apart in (Y, X) order.
const JOIN_LOOKBACK: usize = 8;

/// One merged line (or paragraph) of text.
#[derive(Debug, Clone)]
pub struct MergedLine {
    pub text: String,
    pub bbox: BoundingBox,
    pub style: StyleInfo,
    pub invisible: bool,
}

/// Merge fragments left-to-right into lines.
///
/// Fragments must already be normalized to top-down coordinates; they are
/// sorted here by (Y, X) before merging.
pub fn merge_lines(mut fragments: Vec<TextFragment>) -> Vec<MergedLine> {
    sort_reading_order(&mut fragments);

    let mut lines: Vec<MergedLine> = Vec::new();
    for fragment in fragments {
        let joined = lines
            .iter_mut()
            .rev()
            .take(JOIN_LOOKBACK)
            .find(|line| can_join_line(line, &fragment));

        match joined {
            Some(line) => {
                if needs_joining_space(&line.text, &fragment.text) {
                    line.text.push(' ');
                }
                line.text.push_str(&fragment.text);
                line.bbox = line.bbox.union(&fragment.bbox);
                line.invisible = line.invisible || fragment.invisible;
            }
            None => lines.push(MergedLine {
                text: fragment.text,
                bbox: fragment.bbox,
                style: fragment.style,
                invisible: fragment.invisible,
            }),
        }
    }
    lines
}

/// Join consecutive lines into paragraph blocks. Requires a non-negative
/// vertical gap (overlapping lines never join) and a near-aligned start X.
pub fn merge_paragraphs(lines: Vec<MergedLine>) -> Vec<MergedLine> {
    let mut paragraphs: Vec<MergedLine> = Vec::new();
    for line in lines {
        let joined = paragraphs
            .last_mut()
            .filter(|para| can_join_paragraph(para, &line));

        match joined {
            Some(para) => {
                // De-hyphenate across the line break.
                if para.text.ends_with('-') {
                    para.text.pop();
                } else if needs_joining_space(&para.text, &line.text) {
                    para.text.push(' ');
                }
                para.text.push_str(&line.text);
                para.bbox = para.bbox.union(&line.bbox);
                para.invisible = para.invisible || line.invisible;
            }
            None => paragraphs.push(line),
        }
    }
    paragraphs
}

pub fn sort_reading_order(fragments: &mut [TextFragment]) {
    fragments.sort_by(|a, b| {
        (a.bbox.y, a.bbox.x)
            .partial_cmp(&(b.bbox.y, b.bbox.x))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn can_join_line(line: &MergedLine, fragment: &TextFragment) -> bool {
    if !line.style.is_compatible(&fragment.style) {
        return false;
    }

    let font_size = line.style.font_size.max(fragment.style.font_size).max(1.0);
    if (line.bbox.center_y() - fragment.bbox.center_y()).abs() > VERTICAL_CENTER_FACTOR * font_size
    {
        return false;
    }

    let gap_factor = if line.invisible || fragment.invisible {
        HORIZONTAL_GAP_FACTOR_INVISIBLE
    } else {
        HORIZONTAL_GAP_FACTOR
    };
    let gap = fragment.bbox.x - line.bbox.right();
    gap >= -HORIZONTAL_OVERLAP_FACTOR * font_size && gap <= gap_factor * font_size
}

fn can_join_paragraph(para: &MergedLine, line: &MergedLine) -> bool {
    if !para.style.is_compatible(&line.style) {
        return false;
    }

    let font_size = para.style.font_size.max(1.0);
    let gap = line.bbox.y - para.bbox.bottom();
    gap >= 0.0
        && gap <= PARAGRAPH_GAP_FACTOR * font_size
        && (line.bbox.x - para.bbox.x).abs() <= PARAGRAPH_INDENT_FACTOR * font_size
}

/// A synthetic space is inserted only when the join would otherwise fuse two
/// alphanumeric characters, or trailing punctuation into an alphanumeric.
fn needs_joining_space(left: &str, right: &str) -> bool {
    let Some(last) = left.chars().next_back() else {
        return false;
    };
    let Some(first) = right.chars().next() else {
        return false;
    };
    let left_joins = last.is_alphanumeric() || matches!(last, '.' | ',' | ';' | ':' | '!' | '?');
    left_joins && first.is_alphanumeric()
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

    fn fragment(text: &str, x: f32, y: f32, w: f32, h: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, w, h),
            style: style(12.0),
            invisible: false,
        }
    }

    #[test]
    fn test_adjacent_fragments_merge_with_space() {
        let lines = merge_lines(vec![
            fragment("Hello", 10.0, 100.0, 30.0, 12.0),
            fragment("world", 45.0, 100.0, 30.0, 12.0),
        ]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello world");
        assert_eq!(lines[0].bbox.x, 10.0);
        assert_eq!(lines[0].bbox.right(), 75.0);
    }

    #[test]
    fn test_no_space_after_open_punctuation() {
        let lines = merge_lines(vec![
            fragment("(", 10.0, 100.0, 4.0, 12.0),
            fragment("note", 14.5, 100.0, 25.0, 12.0),
        ]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "(note");
    }

    #[test]
    fn test_space_after_sentence_punctuation() {
        let lines = merge_lines(vec![
            fragment("end.", 10.0, 100.0, 24.0, 12.0),
            fragment("Next", 38.0, 100.0, 26.0, 12.0),
        ]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "end. Next");
    }

    #[test]
    fn test_wide_gap_starts_new_line() {
        let lines = merge_lines(vec![
            fragment("left", 10.0, 100.0, 20.0, 12.0),
            fragment("right", 200.0, 100.0, 25.0, 12.0),
        ]);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_invisible_layer_widens_gap() {
        let mut a = fragment("ocr", 10.0, 100.0, 20.0, 12.0);
        let mut b = fragment("text", 52.0, 100.0, 20.0, 12.0);
        a.invisible = true;
        b.invisible = true;
        // Gap of 22pt: beyond 1.4x of 12pt, inside 2.2x.
        let lines = merge_lines(vec![a, b]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ocr text");
        assert!(lines[0].invisible);
    }

    #[test]
    fn test_vertical_offset_starts_new_line() {
        let lines = merge_lines(vec![
            fragment("upper", 10.0, 100.0, 30.0, 12.0),
            fragment("lower", 45.0, 114.0, 30.0, 12.0),
        ]);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_incompatible_styles_never_merge() {
        let a = fragment("big", 10.0, 100.0, 20.0, 12.0);
        let mut b = fragment("small", 35.0, 100.0, 20.0, 12.0);
        b.style = style(8.0);
        let lines = merge_lines(vec![a, b]);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_paragraph_merge_joins_close_lines() {
        let lines = merge_lines(vec![
            fragment("First line of the", 10.0, 100.0, 100.0, 12.0),
            fragment("paragraph body", 10.0, 115.0, 90.0, 12.0),
        ]);
        let paras = merge_paragraphs(lines);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].text, "First line of the paragraph body");
    }

    #[test]
    fn test_paragraph_merge_dehyphenates() {
        let lines = merge_lines(vec![
            fragment("transla-", 10.0, 100.0, 50.0, 12.0),
            fragment("tion", 10.0, 115.0, 25.0, 12.0),
        ]);
        let paras = merge_paragraphs(lines);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].text, "translation");
    }

    #[test]
    fn test_paragraph_merge_rejects_overlap() {
        // Negative vertical gap: second line overlaps the first.
        let lines = vec![
            MergedLine {
                text: "a".to_string(),
                bbox: BoundingBox::new(10.0, 100.0, 50.0, 14.0),
                style: style(12.0),
                invisible: false,
            },
            MergedLine {
                text: "b".to_string(),
                bbox: BoundingBox::new(10.0, 110.0, 50.0, 14.0),
                style: style(12.0),
                invisible: false,
            },
        ];
        assert_eq!(merge_paragraphs(lines).len(), 2);
    }

    #[test]
    fn test_paragraph_merge_rejects_indent_jump() {
        let lines = merge_lines(vec![
            fragment("body text here", 10.0, 100.0, 80.0, 12.0),
            fragment("caption", 200.0, 115.0, 40.0, 12.0),
        ]);
        assert_eq!(merge_paragraphs(lines).len(), 2);
    }
}
