//! Page reconstruction: translated page models back into a PDF.
//!
//! Pages are emitted in page-number order at their source dimensions and
//! rotation. Images draw first (aspect-preserving fit into their boxes),
//! then text blocks in (Y, X) order with the dynamic font-size fit. A single
//! block failing to draw is logged and skipped; it never aborts the page or
//! the run.

pub mod fit;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::model::{ImageBlock, PageObject, TextBlock};

pub struct Reconstructor<'a> {
    pdfium: &'a Pdfium,
    config: &'a RenderConfig,
}

impl<'a> Reconstructor<'a> {
    pub fn new(pdfium: &'a Pdfium, config: &'a RenderConfig) -> Self {
        Self { pdfium, config }
    }

    /// Build the output document. `pages` may arrive in any completion
    /// order; a deterministic page-number order is imposed here.
    pub fn reconstruct(&self, pages: &[PageObject]) -> Result<PdfDocument<'a>, RenderError> {
        let mut document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| RenderError::PageCreate {
                page: 0,
                message: format!("{e:?}"),
            })?;

        let mut ordered: Vec<&PageObject> = pages.iter().collect();
        ordered.sort_by_key(|p| p.page_number);

        let fonts = FontSet::load(&mut document);

        for page_object in ordered {
            self.reconstruct_page(&mut document, &fonts, page_object)?;
        }

        Ok(document)
    }

    fn reconstruct_page(
        &self,
        document: &mut PdfDocument<'a>,
        fonts: &FontSet,
        source: &PageObject,
    ) -> Result<(), RenderError> {
        let page_error = |e: PdfiumError| RenderError::PageCreate {
            page: source.page_number,
            message: format!("{e:?}"),
        };

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(source.source_width),
                PdfPoints::new(source.source_height),
            ))
            .map_err(page_error)?;

        if source.rotation != 0 {
            page.set_rotation(rotation_from_degrees(source.rotation));
        }

        // Images go under the text.
        for image in &source.image_blocks {
            if let Err(e) = self.draw_image(&mut page, source, image) {
                warn!(
                    page = source.page_number,
                    block = %image.id,
                    error = ?e,
                    "Skipping undrawable image block"
                );
            }
        }

        let mut drawn = 0usize;
        for block in &source.text_blocks {
            match self.draw_text_block(&mut page, fonts, source, block) {
                Ok(()) => drawn += 1,
                Err(e) => {
                    warn!(
                        page = source.page_number,
                        block = %block.id,
                        error = ?e,
                        "Skipping undrawable text block"
                    );
                }
            }
        }

        debug!(
            page = source.page_number,
            text_blocks = drawn,
            images = source.image_blocks.len(),
            "Page reconstructed"
        );
        Ok(())
    }

    fn draw_image(
        &self,
        page: &mut PdfPage<'a>,
        source: &PageObject,
        image: &ImageBlock,
    ) -> Result<(), PdfiumError> {
        let decoded: DynamicImage =
            image::load_from_memory(&image.bytes).map_err(|_| PdfiumError::ImageError)?;

        // Aspect-preserving fit into the block box, centered.
        let (pixel_w, pixel_h) = (decoded.width() as f32, decoded.height() as f32);
        let scale = (image.bbox.width / pixel_w)
            .min(image.bbox.height / pixel_h)
            .max(f32::MIN_POSITIVE);
        let draw_w = pixel_w * scale;
        let draw_h = pixel_h * scale;
        let x = image.bbox.x + (image.bbox.width - draw_w) / 2.0;
        // Top-down box back to bottom-up drawing coordinates.
        let y = source.height - image.bbox.bottom() + (image.bbox.height - draw_h) / 2.0;

        page.objects_mut().create_image_object(
            PdfPoints::new(x),
            PdfPoints::new(y),
            &decoded,
            Some(PdfPoints::new(draw_w)),
            Some(PdfPoints::new(draw_h)),
        )?;
        Ok(())
    }

    fn draw_text_block(
        &self,
        page: &mut PdfPage<'a>,
        fonts: &FontSet,
        source: &PageObject,
        block: &TextBlock,
    ) -> Result<(), PdfiumError> {
        let text = block.translated_text.trim();
        if text.is_empty() {
            return Ok(());
        }

        if self.config.clear_background {
            let rect = PdfRect::new(
                PdfPoints::new(source.height - block.bbox.bottom()),
                PdfPoints::new(block.bbox.x),
                PdfPoints::new(source.height - block.bbox.y),
                PdfPoints::new(block.bbox.right()),
            );
            page.objects_mut().create_path_object_rect(
                rect,
                None,
                None,
                Some(PdfColor::new(255, 255, 255, 255)),
            )?;
        }

        let fitted = fit::fit_text(
            text,
            block.bbox.width,
            block.bbox.height,
            &block.style,
            self.config,
        );
        let line_height = fitted.font_size * self.config.line_height_factor;
        let font = fonts.select(block.style.bold, block.style.italic);
        let color = PdfColor::new(
            (block.style.color[0] * 255.0).round() as u8,
            (block.style.color[1] * 255.0).round() as u8,
            (block.style.color[2] * 255.0).round() as u8,
            255,
        );

        for (index, line) in fitted.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            // First baseline sits one line height below the box top; lines
            // that would fall below the box bottom are truncated.
            let offset = (index + 1) as f32 * line_height;
            if offset > block.bbox.height + line_height * 0.5 {
                debug!(
                    block = %block.id,
                    dropped = fitted.lines.len() - index,
                    "Truncating overflowing lines"
                );
                break;
            }
            let baseline_y = source.height - (block.bbox.y + offset);

            let mut object = page.objects_mut().create_text_object(
                PdfPoints::new(block.bbox.x),
                PdfPoints::new(baseline_y),
                line,
                font,
                PdfPoints::new(fitted.font_size),
            )?;
            object.set_fill_color(color)?;
        }

        Ok(())
    }
}

/// The built-in Helvetica family used for all redrawn text.
struct FontSet {
    regular: PdfFontToken,
    bold: PdfFontToken,
    italic: PdfFontToken,
    bold_italic: PdfFontToken,
}

impl FontSet {
    fn load(document: &mut PdfDocument) -> Self {
        let fonts = document.fonts_mut();
        Self {
            regular: fonts.helvetica(),
            bold: fonts.helvetica_bold(),
            italic: fonts.helvetica_oblique(),
            bold_italic: fonts.helvetica_bold_oblique(),
        }
    }

    fn select(&self, bold: bool, italic: bool) -> PdfFontToken {
        match (bold, italic) {
            (true, true) => self.bold_italic,
            (true, false) => self.bold,
            (false, true) => self.italic,
            (false, false) => self.regular,
        }
    }
}

fn rotation_from_degrees(degrees: u16) -> PdfPageRenderRotation {
    match degrees {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}
