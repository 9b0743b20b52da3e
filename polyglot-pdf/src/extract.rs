//! Layout extraction: one page's content stream → a [`PageObject`].
//!
//! Stages, in order: fragment capture, coordinate normalization, noise
//! rejection, text-layer arbitration, line merge (optionally paragraph
//! merge), duplicate-block removal, image filtering.

pub mod dedupe;
pub mod fragments;
pub mod images;
pub mod layers;
pub mod merge;
pub mod noise;
pub mod normalize;

use pdfium_render::prelude::*;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{ImageBlock, PageObject, TextBlock, TextFragment, image_block_id, text_block_id};
use crate::pdfio;

use images::ImagePlacement;
use layers::TextLayer;
use normalize::PageGeometry;

pub struct PageExtractor<'a> {
    config: &'a ExtractionConfig,
}

impl<'a> PageExtractor<'a> {
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract one page into a [`PageObject`], including the standalone
    /// single-page payload used for provider grounding and OCR.
    pub fn extract_page(
        &self,
        pdfium: &Pdfium,
        document: &PdfDocument,
        page: &PdfPage,
        page_index: u16,
        page_number: u16,
    ) -> Result<PageObject, ExtractError> {
        let geometry = page_geometry(page);

        let (raw_texts, raw_images) = fragments::capture_page(page, page_number);
        let raw_text_count = raw_texts.len();

        // Normalize, then drop artifacts.
        let mut candidates: Vec<TextFragment> = raw_texts
            .into_iter()
            .filter_map(|raw| {
                normalize::normalize_box(raw.bbox, &geometry).map(|bbox| TextFragment {
                    text: raw.text,
                    bbox,
                    style: raw.style,
                    invisible: raw.invisible,
                })
            })
            .filter(|fragment| !noise::is_noise(fragment))
            .collect();

        // Keep exactly one text layer.
        let stats = layers::LayerStats::collect(&candidates);
        let chosen = layers::choose_layer(&stats, self.config.layer_fallback_only);
        candidates.retain(|f| match chosen {
            TextLayer::Visible => !f.invisible,
            TextLayer::Invisible => f.invisible,
        });

        let mut lines = merge::merge_lines(candidates);
        if self.config.paragraph_merge {
            lines = merge::merge_paragraphs(lines);
        }
        let mut lines = dedupe::dedupe_lines(lines);

        lines.sort_by(|a, b| {
            (a.bbox.y, a.bbox.x)
                .partial_cmp(&(b.bbox.y, b.bbox.x))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let text_blocks: Vec<TextBlock> = lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                TextBlock::new(
                    text_block_id(page_number, index),
                    line.bbox,
                    line.text,
                    line.style,
                )
            })
            .collect();
        let text_chars: usize = text_blocks
            .iter()
            .map(|b| b.original_text.chars().count())
            .sum();

        let placements: Vec<ImagePlacement> = raw_images
            .into_iter()
            .filter_map(|raw| {
                normalize::normalize_box(raw.bbox, &geometry).map(|bbox| ImagePlacement {
                    bytes: raw.bytes,
                    mime_type: raw.mime_type,
                    bbox,
                })
            })
            .collect();
        let image_blocks: Vec<ImageBlock> = images::filter_images(
            placements,
            geometry.width,
            geometry.height,
            text_chars,
            self.config,
        )
        .into_iter()
        .enumerate()
        .map(|(index, placement)| ImageBlock {
            id: image_block_id(page_number, index),
            bbox: placement.bbox,
            bytes: placement.bytes,
            mime_type: placement.mime_type,
        })
        .collect();

        let source_pdf = pdfio::single_page_payload(pdfium, document, page_index, page_number)?;

        debug!(
            page = page_number,
            fragments = raw_text_count,
            blocks = text_blocks.len(),
            images = image_blocks.len(),
            layer = ?chosen,
            "Page extracted"
        );

        Ok(PageObject {
            page_number,
            width: geometry.width,
            height: geometry.height,
            source_width: geometry.media_width,
            source_height: geometry.media_height,
            rotation: rotation_degrees(page),
            source_pdf,
            text_blocks,
            image_blocks,
        })
    }
}

fn page_geometry(page: &PdfPage) -> PageGeometry {
    let width = page.width().value;
    let height = page.height().value;

    let media = page.boundaries().media().map(|b| b.bounds).ok();
    let crop = page.boundaries().crop().map(|b| b.bounds).ok();

    let (media_width, media_height) = match &media {
        Some(m) => (m.right.value - m.left.value, m.top.value - m.bottom.value),
        None => (width, height),
    };

    let (crop_offset_x, crop_offset_y) = match (&media, &crop) {
        (Some(m), Some(c)) => (c.left.value - m.left.value, c.bottom.value - m.bottom.value),
        _ => (0.0, 0.0),
    };

    PageGeometry {
        width,
        height,
        media_width,
        media_height,
        crop_offset_x,
        crop_offset_y,
    }
}

fn rotation_degrees(page: &PdfPage) -> u16 {
    match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => 90,
        Ok(PdfPageRenderRotation::Degrees180) => 180,
        Ok(PdfPageRenderRotation::Degrees270) => 270,
        _ => 0,
    }
}
