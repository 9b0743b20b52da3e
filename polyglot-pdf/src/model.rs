//! Document model shared by extraction, orchestration, and reconstruction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geometry::{BoundingBox, StyleInfo};

/// A single positioned glyph run or image placement, before merging.
/// Transient: consumed by the merge passes, never persisted.
#[derive(Debug, Clone)]
pub struct TextFragment {
    pub text: String,
    pub bbox: BoundingBox,
    pub style: StyleInfo,
    /// True when the fragment comes from an invisible text layer
    /// (OCR or legacy overlay, render mode 3).
    pub invisible: bool,
}

/// A merged, stably-identified unit of translatable text.
#[derive(Debug, Clone)]
pub struct TextBlock {
    /// Page-scoped, deterministic id derived from page number and
    /// extraction-order index, never from content.
    pub id: String,
    pub bbox: BoundingBox,
    pub original_text: String,
    /// Defaults to `original_text`; mutated only by translation application.
    pub translated_text: String,
    pub style: StyleInfo,
}

impl TextBlock {
    pub fn new(id: String, bbox: BoundingBox, text: String, style: StyleInfo) -> Self {
        Self {
            id,
            bbox,
            translated_text: text.clone(),
            original_text: text,
            style,
        }
    }
}

/// One extracted image placement. Immutable once created.
#[derive(Debug, Clone)]
pub struct ImageBlock {
    pub id: String,
    pub bbox: BoundingBox,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Everything the pipeline knows about one page.
///
/// Created once by the extractor; the orchestrator mutates
/// `text_blocks[].translated_text`, the reconstructor reads.
#[derive(Debug, Clone)]
pub struct PageObject {
    /// 1-indexed page number.
    pub page_number: u16,
    /// Visible (crop) region dimensions, in points.
    pub width: f32,
    pub height: f32,
    /// Nominal (media) page dimensions, in points.
    pub source_width: f32,
    pub source_height: f32,
    /// Page rotation in degrees (0, 90, 180, 270).
    pub rotation: u16,
    /// Standalone single-page PDF payload for provider grounding and OCR.
    pub source_pdf: Vec<u8>,
    pub text_blocks: Vec<TextBlock>,
    pub image_blocks: Vec<ImageBlock>,
}

impl PageObject {
    /// Content hash over the ordered `(block_id, cleaned_text)` pairs.
    /// Changes if and only if extracted text content changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for block in &self.text_blocks {
            hasher.update(block.id.as_bytes());
            hasher.update([0x1f]);
            hasher.update(clean_text(&block.original_text).as_bytes());
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Apply translated items by block id. Returns the number applied.
    /// Unknown ids are ignored; blocks without a matching item keep their
    /// original text.
    pub fn apply_items(&mut self, items: &[TranslatedTextItem]) -> usize {
        let mut applied = 0;
        for block in &mut self.text_blocks {
            if let Some(item) = items.iter().find(|i| i.block_id == block.id) {
                block.translated_text = item.translated_text.clone();
                applied += 1;
            }
        }
        applied
    }

    /// Clone of this page containing only the given text blocks, for
    /// partial re-translation.
    pub fn reduced_to(&self, ids: &HashSet<String>) -> PageObject {
        PageObject {
            text_blocks: self
                .text_blocks
                .iter()
                .filter(|b| ids.contains(&b.id))
                .cloned()
                .collect(),
            image_blocks: Vec::new(),
            source_pdf: self.source_pdf.clone(),
            ..self.clone()
        }
    }

    pub fn text_char_count(&self) -> usize {
        self.text_blocks
            .iter()
            .map(|b| b.original_text.chars().count())
            .sum()
    }
}

/// Wire and checkpoint record: the contract between the translation client,
/// the checkpoint store, and page-application logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedTextItem {
    pub block_id: String,
    pub original_text: String,
    pub translated_text: String,
}

/// Deterministic text block id: page number + extraction-order index.
pub fn text_block_id(page_number: u16, index: usize) -> String {
    format!("p{page_number:04}-t{index:03}")
}

/// Deterministic image block id.
pub fn image_block_id(page_number: u16, index: usize) -> String {
    format!("p{page_number:04}-i{index:03}")
}

/// Collapse whitespace runs to single spaces and trim. Used for
/// fingerprinting and duplicate detection so layout-only differences in
/// whitespace never invalidate a cache.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_style() -> StyleInfo {
        StyleInfo {
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
            color: [0.0, 0.0, 0.0],
            bold: false,
            italic: false,
        }
    }

    pub(crate) fn test_page(texts: &[&str]) -> PageObject {
        let blocks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                TextBlock::new(
                    text_block_id(1, i),
                    BoundingBox::new(10.0, 20.0 + 30.0 * i as f32, 100.0, 14.0),
                    t.to_string(),
                    test_style(),
                )
            })
            .collect();
        PageObject {
            page_number: 1,
            width: 612.0,
            height: 792.0,
            source_width: 612.0,
            source_height: 792.0,
            rotation: 0,
            source_pdf: Vec::new(),
            text_blocks: blocks,
            image_blocks: Vec::new(),
        }
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Hello \t world\n"), "Hello world");
    }

    #[test]
    fn test_fingerprint_stable_across_whitespace() {
        let a = test_page(&["Hello  world"]);
        let b = test_page(&["Hello world"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = test_page(&["Hello world", "Second line"]);
        let b = test_page(&["Hello world", "Second lime"]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_apply_items_by_id() {
        let mut page = test_page(&["Hello world", "Second line"]);
        let applied = page.apply_items(&[TranslatedTextItem {
            block_id: text_block_id(1, 1),
            original_text: "Second line".to_string(),
            translated_text: "Deuxième ligne".to_string(),
        }]);
        assert_eq!(applied, 1);
        assert_eq!(page.text_blocks[0].translated_text, "Hello world");
        assert_eq!(page.text_blocks[1].translated_text, "Deuxième ligne");
    }

    #[test]
    fn test_reduced_to_filters_blocks() {
        let page = test_page(&["a", "b", "c"]);
        let ids: HashSet<String> = [text_block_id(1, 2)].into_iter().collect();
        let reduced = page.reduced_to(&ids);
        assert_eq!(reduced.text_blocks.len(), 1);
        assert_eq!(reduced.text_blocks[0].original_text, "c");
        assert!(reduced.image_blocks.is_empty());
    }
}
