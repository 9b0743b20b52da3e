//! Coordinate normalization.
//!
//! A page's visible region may be offset from its nominal origin (crop box
//! differing from media box), and content streams are inconsistent about
//! which origin their coordinates use. For each raw box we build two
//! candidate placements (crop-shifted and unshifted), clip both against the
//! page, score them, and keep the winner with Y flipped to top-down.

use crate::geometry::BoundingBox;

/// Score deducted per box edge sitting exactly on the page boundary after
/// clipping; an exactly-flush edge usually means the candidate over-shifted.
const EDGE_PENALTY: f32 = 0.15;

/// Score deltas below this are ties; with a declared non-zero crop offset a
/// tie goes to the shifted candidate.
const TIE_EPSILON: f32 = 0.05;

/// Distance within which an edge counts as sitting on the boundary.
const BOUNDARY_EPSILON: f32 = 0.05;

/// Raw bottom-up box as read from the content stream.
#[derive(Debug, Clone, Copy)]
pub struct RawBox {
    pub left: f32,
    pub bottom: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-page geometry needed to normalize raw boxes.
#[derive(Debug, Clone, Copy)]
pub struct PageGeometry {
    /// Visible (crop) dimensions; the page size everything is clipped to.
    pub width: f32,
    pub height: f32,
    /// Nominal (media) dimensions.
    pub media_width: f32,
    pub media_height: f32,
    /// Crop box origin relative to the media box origin.
    pub crop_offset_x: f32,
    pub crop_offset_y: f32,
}

impl PageGeometry {
    pub fn has_crop_offset(&self) -> bool {
        self.crop_offset_x.abs() > BOUNDARY_EPSILON || self.crop_offset_y.abs() > BOUNDARY_EPSILON
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    clipped: RawBox,
    score: f32,
}

/// Normalize one raw bottom-up box into top-down page space.
///
/// Returns `None` when both candidates clip to nothing.
pub fn normalize_box(raw: RawBox, geom: &PageGeometry) -> Option<BoundingBox> {
    if raw.width <= 0.0 || raw.height <= 0.0 {
        return None;
    }

    let shifted = RawBox {
        left: raw.left - geom.crop_offset_x,
        bottom: raw.bottom - geom.crop_offset_y,
        ..raw
    };

    let shifted = score_candidate(shifted, geom);
    let unshifted = score_candidate(raw, geom);

    let winner = match (shifted, unshifted) {
        (None, None) => return None,
        (Some(s), None) => s,
        (None, Some(u)) => u,
        (Some(s), Some(u)) => {
            if (s.score - u.score).abs() <= TIE_EPSILON {
                // Near-tie: a declared offset means the shifted reading is
                // the intended one.
                if geom.has_crop_offset() { s } else { u }
            } else if s.score > u.score {
                s
            } else {
                u
            }
        }
    };

    let b = winner.clipped;
    Some(BoundingBox::new(
        b.left,
        geom.height - (b.bottom + b.height),
        b.width,
        b.height,
    ))
}

fn score_candidate(candidate: RawBox, geom: &PageGeometry) -> Option<Candidate> {
    let original_area = candidate.width * candidate.height;

    let left = candidate.left.max(0.0);
    let bottom = candidate.bottom.max(0.0);
    let right = (candidate.left + candidate.width).min(geom.width);
    let top = (candidate.bottom + candidate.height).min(geom.height);

    let width = right - left;
    let height = top - bottom;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    let retained = (width * height) / original_area;

    let mut flush_edges = 0;
    if left.abs() < BOUNDARY_EPSILON {
        flush_edges += 1;
    }
    if bottom.abs() < BOUNDARY_EPSILON {
        flush_edges += 1;
    }
    if (right - geom.width).abs() < BOUNDARY_EPSILON {
        flush_edges += 1;
    }
    if (top - geom.height).abs() < BOUNDARY_EPSILON {
        flush_edges += 1;
    }

    Some(Candidate {
        clipped: RawBox {
            left,
            bottom,
            width,
            height,
        },
        score: retained - EDGE_PENALTY * flush_edges as f32,
    })
}
