//! Overlapping duplicate block removal.
//!
//! Some generators emit the same text twice at a near-identical position
//! (fake-bold double strikes, layered exports). Two blocks with identical
//! cleaned text, heavy overlap, and a tiny offset are one block; the larger
//! one survives.

use crate::model::clean_text;

use super::merge::MergedLine;

/// Minimum bounding-box overlap (fraction of the smaller box) for two
/// same-text blocks to count as duplicates.
const DUPLICATE_OVERLAP_RATIO: f32 = 0.72;

/// Maximum positional offset, in points, for duplicates.
const DUPLICATE_MAX_OFFSET: f32 = 4.0;

pub fn dedupe_lines(lines: Vec<MergedLine>) -> Vec<MergedLine> {
    let mut kept: Vec<MergedLine> = Vec::with_capacity(lines.len());

    for line in lines {
        match kept.iter_mut().find(|k| is_duplicate(k, &line)) {
            Some(existing) => {
                if line.bbox.area() > existing.bbox.area() {
                    *existing = line;
                }
            }
            None => kept.push(line),
        }
    }
    kept
}

fn is_duplicate(a: &MergedLine, b: &MergedLine) -> bool {
    (a.bbox.x - b.bbox.x).abs() <= DUPLICATE_MAX_OFFSET
        && (a.bbox.y - b.bbox.y).abs() <= DUPLICATE_MAX_OFFSET
        && a.bbox.overlap_ratio(&b.bbox) >= DUPLICATE_OVERLAP_RATIO
        && clean_text(&a.text) == clean_text(&b.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, StyleInfo};

    fn line(text: &str, x: f32, y: f32, w: f32, h: f32) -> MergedLine {
        MergedLine {
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, w, h),
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
    fn test_double_strike_collapses_to_larger() {
        let deduped = dedupe_lines(vec![
            line("Heading", 10.0, 100.0, 80.0, 14.0),
            line("Heading", 10.5, 100.5, 81.0, 14.5),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].bbox.width, 81.0);
    }

    #[test]
    fn test_different_text_kept() {
        let deduped = dedupe_lines(vec![
            line("Heading", 10.0, 100.0, 80.0, 14.0),
            line("Headline", 10.0, 100.0, 80.0, 14.0),
        ]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_same_text_far_apart_kept() {
        // A repeated header and footer are not duplicates of each other.
        let deduped = dedupe_lines(vec![
            line("Confidential", 10.0, 20.0, 80.0, 12.0),
            line("Confidential", 10.0, 760.0, 80.0, 12.0),
        ]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_offset_beyond_tolerance_kept() {
        let deduped = dedupe_lines(vec![
            line("Shadow", 10.0, 100.0, 60.0, 12.0),
            line("Shadow", 16.0, 100.0, 60.0, 12.0),
        ]);
        assert_eq!(deduped.len(), 2);
    }
}
