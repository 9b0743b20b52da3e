//! Image block filtering: content dedup, proximity merge, and background
//! suppression.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::geometry::BoundingBox;

/// Placements closer than this (in points) merge into one block.
const PROXIMITY_MERGE_GAP: f32 = 8.0;

/// Page-area fraction above which an image is a background candidate.
const BACKGROUND_COVERAGE: f32 = 0.90;

/// An image whose edges all sit within this fraction of the page dimensions
/// from the page frame is a near-frame background candidate.
const FRAME_MARGIN_FRACTION: f32 = 0.05;

/// Overlap fraction above which two same-content placements are one
/// placement.
const CONTENT_DUPLICATE_OVERLAP: f32 = 0.5;

/// One extracted image placement, before filtering.
#[derive(Debug, Clone)]
pub struct ImagePlacement {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub bbox: BoundingBox,
}

/// Run the full image filter chain for one page.
pub fn filter_images(
    placements: Vec<ImagePlacement>,
    page_width: f32,
    page_height: f32,
    text_chars: usize,
    config: &ExtractionConfig,
) -> Vec<ImagePlacement> {
    let before = placements.len();
    let deduped = dedupe_by_content(placements);
    let merged = merge_by_proximity(deduped);
    let kept = suppress_backgrounds(merged, page_width, page_height, text_chars, config);

    if kept.len() != before {
        debug!(
            before = before,
            after = kept.len(),
            "Filtered page images"
        );
    }
    kept
}

/// Drop placements that repeat the same content at (near) the same spot.
fn dedupe_by_content(placements: Vec<ImagePlacement>) -> Vec<ImagePlacement> {
    let mut kept: Vec<(String, ImagePlacement)> = Vec::with_capacity(placements.len());

    for placement in placements {
        let hash = content_hash(&placement.bytes);
        let duplicate = kept.iter().any(|(existing_hash, existing)| {
            *existing_hash == hash
                && existing.bbox.overlap_ratio(&placement.bbox) > CONTENT_DUPLICATE_OVERLAP
        });
        if !duplicate {
            kept.push((hash, placement));
        }
    }
    kept.into_iter().map(|(_, p)| p).collect()
}

/// Collapse nearby or overlapping placements into one block. The placement
/// with the largest area contributes the bytes; the box is the union.
fn merge_by_proximity(placements: Vec<ImagePlacement>) -> Vec<ImagePlacement> {
    let mut groups: Vec<ImagePlacement> = Vec::new();

    for placement in placements {
        let expanded = BoundingBox::new(
            placement.bbox.x - PROXIMITY_MERGE_GAP,
            placement.bbox.y - PROXIMITY_MERGE_GAP,
            placement.bbox.width + 2.0 * PROXIMITY_MERGE_GAP,
            placement.bbox.height + 2.0 * PROXIMITY_MERGE_GAP,
        );
        match groups
            .iter_mut()
            .find(|g| g.bbox.intersection_area(&expanded) > 0.0)
        {
            Some(group) => {
                let union = group.bbox.union(&placement.bbox);
                if placement.bbox.area() > group.bbox.area() {
                    group.bytes = placement.bytes;
                    group.mime_type = placement.mime_type;
                }
                group.bbox = union;
            }
            None => groups.push(placement),
        }
    }
    groups
}

fn suppress_backgrounds(
    placements: Vec<ImagePlacement>,
    page_width: f32,
    page_height: f32,
    text_chars: usize,
    config: &ExtractionConfig,
) -> Vec<ImagePlacement> {
    let page_area = page_width * page_height;
    if page_area <= 0.0 {
        return placements;
    }

    placements
        .into_iter()
        .filter(|p| {
            let coverage = p.bbox.area() / page_area;
            let background = coverage >= BACKGROUND_COVERAGE
                || is_near_frame(&p.bbox, page_width, page_height);
            if background && text_chars >= config.background_text_chars {
                return false;
            }
            // Text-bearing pages never keep page-spanning images.
            if text_chars > 0 && coverage > config.max_image_page_coverage {
                return false;
            }
            true
        })
        .collect()
}

fn is_near_frame(bbox: &BoundingBox, page_width: f32, page_height: f32) -> bool {
    let margin_x = FRAME_MARGIN_FRACTION * page_width;
    let margin_y = FRAME_MARGIN_FRACTION * page_height;
    bbox.x <= margin_x
        && bbox.y <= margin_y
        && bbox.right() >= page_width - margin_x
        && bbox.bottom() >= page_height - margin_y
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn placement(bytes: &[u8], x: f32, y: f32, w: f32, h: f32) -> ImagePlacement {
        ImagePlacement {
            bytes: bytes.to_vec(),
            mime_type: "image/png".to_string(),
            bbox: BoundingBox::new(x, y, w, h),
        }
    }

    #[test]
    fn test_same_content_same_spot_deduped() {
        let kept = filter_images(
            vec![
                placement(b"logo", 10.0, 10.0, 50.0, 50.0),
                placement(b"logo", 11.0, 10.0, 50.0, 50.0),
            ],
            612.0,
            792.0,
            500,
            &ExtractionConfig::default(),
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_same_content_distinct_spots_kept_as_two() {
        // A repeated ornament at the top and bottom of the page; they are
        // far apart, so neither dedup nor proximity merge collapses them.
        let kept = filter_images(
            vec![
                placement(b"ornament", 10.0, 10.0, 40.0, 20.0),
                placement(b"ornament", 10.0, 700.0, 40.0, 20.0),
            ],
            612.0,
            792.0,
            500,
            &ExtractionConfig::default(),
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_tiled_strips_merge_into_one_block() {
        // Scanners emit full-width strips; they touch, so they merge.
        let kept = filter_images(
            vec![
                placement(b"strip1", 50.0, 100.0, 200.0, 40.0),
                placement(b"strip2", 50.0, 140.0, 200.0, 40.0),
                placement(b"strip3", 50.0, 180.0, 200.0, 40.0),
            ],
            612.0,
            792.0,
            500,
            &ExtractionConfig::default(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox.height, 120.0);
    }

    #[test]
    fn test_full_page_background_suppressed_on_texty_page() {
        let kept = filter_images(
            vec![placement(b"scan", 0.0, 0.0, 612.0, 792.0)],
            612.0,
            792.0,
            500,
            &ExtractionConfig::default(),
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn test_full_page_image_kept_on_textless_page() {
        // A pure scan page: the image is the content.
        let kept = filter_images(
            vec![placement(b"scan", 0.0, 0.0, 612.0, 792.0)],
            612.0,
            792.0,
            0,
            &ExtractionConfig::default(),
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_normal_figure_kept() {
        let kept = filter_images(
            vec![placement(b"figure", 100.0, 200.0, 200.0, 150.0)],
            612.0,
            792.0,
            500,
            &ExtractionConfig::default(),
        );
        assert_eq!(kept.len(), 1);
    }
}
