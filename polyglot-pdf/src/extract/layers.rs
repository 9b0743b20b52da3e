//! Dual text-layer arbitration.
//!
//! Scanned PDFs often carry two text layers: a visible one (sometimes a
//! degenerate vector conversion) and an invisible OCR layer. The extractor
//! keeps exactly one. The decision is a pure function over four scalars so
//! it can be tested without any PDF parsing.

use crate::model::TextFragment;

/// Invisible layer must carry this many times the visible layer's characters
/// to win on density alone.
const DENSITY_DOMINANCE_FACTOR: f32 = 1.5;

/// Wide-margin dominance needed when the visible layer is sparse/degenerate,
/// and always in fallback-only mode.
const WIDE_DOMINANCE_FACTOR: f32 = 3.0;

/// Below this many visible characters the visible layer counts as sparse.
const SPARSE_VISIBLE_CHARS: usize = 40;

/// Visible layers averaging fewer characters per fragment than this are
/// degenerate (single-glyph vector soup).
const SPARSE_CHARS_PER_FRAGMENT: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLayer {
    Visible,
    Invisible,
}

/// Content-density measurements for both layers of one page.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerStats {
    pub visible_chars: usize,
    pub visible_fragments: usize,
    pub invisible_chars: usize,
    pub invisible_fragments: usize,
}

impl LayerStats {
    pub fn collect(fragments: &[TextFragment]) -> Self {
        let mut stats = LayerStats::default();
        for fragment in fragments {
            let chars = fragment.text.chars().filter(|c| !c.is_whitespace()).count();
            if fragment.invisible {
                stats.invisible_chars += chars;
                stats.invisible_fragments += 1;
            } else {
                stats.visible_chars += chars;
                stats.visible_fragments += 1;
            }
        }
        stats
    }

    fn visible_density(&self) -> f32 {
        if self.visible_fragments == 0 {
            0.0
        } else {
            self.visible_chars as f32 / self.visible_fragments as f32
        }
    }

    fn invisible_density(&self) -> f32 {
        if self.invisible_fragments == 0 {
            0.0
        } else {
            self.invisible_chars as f32 / self.invisible_fragments as f32
        }
    }
}

/// Pick the layer to keep for a page.
///
/// `fallback_only` restricts the invisible layer to cases where it clearly
/// exceeds the visible one, instead of the plain density comparison.
pub fn choose_layer(stats: &LayerStats, fallback_only: bool) -> TextLayer {
    if stats.invisible_chars == 0 {
        return TextLayer::Visible;
    }
    if stats.visible_chars == 0 {
        return TextLayer::Invisible;
    }

    let visible_sparse = stats.visible_chars < SPARSE_VISIBLE_CHARS
        || stats.visible_density() < SPARSE_CHARS_PER_FRAGMENT;
    let invisible_chars = stats.invisible_chars as f32;
    let visible_chars = stats.visible_chars as f32;

    if fallback_only {
        return if visible_sparse && invisible_chars > WIDE_DOMINANCE_FACTOR * visible_chars {
            TextLayer::Invisible
        } else {
            TextLayer::Visible
        };
    }

    if invisible_chars > DENSITY_DOMINANCE_FACTOR * visible_chars
        && stats.invisible_density() > stats.visible_density()
    {
        return TextLayer::Invisible;
    }
    if visible_sparse && invisible_chars > WIDE_DOMINANCE_FACTOR * visible_chars {
        return TextLayer::Invisible;
    }
    TextLayer::Visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(vc: usize, vf: usize, ic: usize, inf: usize) -> LayerStats {
        LayerStats {
            visible_chars: vc,
            visible_fragments: vf,
            invisible_chars: ic,
            invisible_fragments: inf,
        }
    }

    #[test]
    fn test_no_invisible_layer_keeps_visible() {
        assert_eq!(
            choose_layer(&stats(500, 40, 0, 0), false),
            TextLayer::Visible
        );
    }

    #[test]
    fn test_no_visible_layer_uses_invisible() {
        assert_eq!(
            choose_layer(&stats(0, 0, 800, 60), false),
            TextLayer::Invisible
        );
    }

    #[test]
    fn test_dense_invisible_ocr_wins() {
        // Typical scan: a handful of visible artifacts, a full OCR layer.
        assert_eq!(
            choose_layer(&stats(60, 50, 2400, 90), false),
            TextLayer::Invisible
        );
    }

    #[test]
    fn test_healthy_visible_text_wins() {
        assert_eq!(
            choose_layer(&stats(2000, 80, 2200, 85), false),
            TextLayer::Visible
        );
    }

    #[test]
    fn test_sparse_visible_overridden_by_wide_margin() {
        // Visible layer is single-glyph soup; invisible dominates widely
        // even though its per-fragment density is lower.
        assert_eq!(
            choose_layer(&stats(30, 30, 400, 500), false),
            TextLayer::Invisible
        );
    }

    #[test]
    fn test_fallback_only_requires_wide_margin() {
        let s = stats(60, 50, 2400, 90);
        assert_eq!(choose_layer(&s, false), TextLayer::Invisible);
        // Same page in fallback-only mode: visible is not sparse enough to
        // override? 60 chars with 1.2 chars/fragment is degenerate, and the
        // margin is wide, so the override still fires.
        assert_eq!(choose_layer(&s, true), TextLayer::Invisible);
        // A merely-better invisible layer does not.
        assert_eq!(choose_layer(&stats(300, 40, 600, 50), true), TextLayer::Visible);
    }
}
