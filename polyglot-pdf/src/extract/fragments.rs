//! Raw fragment capture from a page's content stream.
//!
//! Walks the page objects once, emitting a raw bottom-up box per rendered
//! glyph run and per image placement. Individual malformed objects are
//! skipped with a warning; capture never aborts the page.

use image::ExtendedColorType;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use pdfium_render::prelude::*;
use tracing::warn;

use crate::geometry::StyleInfo;

use super::normalize::RawBox;

/// A glyph run before coordinate normalization.
#[derive(Debug, Clone)]
pub struct RawTextFragment {
    pub text: String,
    pub bbox: RawBox,
    pub style: StyleInfo,
    pub invisible: bool,
}

/// An image placement before coordinate normalization.
#[derive(Debug, Clone)]
pub struct RawImagePlacement {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub bbox: RawBox,
}

/// Capture every positioned glyph run and image on the page.
pub fn capture_page(
    page: &PdfPage,
    page_number: u16,
) -> (Vec<RawTextFragment>, Vec<RawImagePlacement>) {
    let mut texts = Vec::new();
    let mut images = Vec::new();

    for object in page.objects().iter() {
        if let Some(text_object) = object.as_text_object() {
            match capture_text_object(&object, text_object) {
                Ok(Some(fragment)) => texts.push(fragment),
                Ok(None) => {}
                Err(e) => {
                    warn!(page = page_number, error = ?e, "Skipping unreadable text object");
                }
            }
        } else if let Some(image_object) = object.as_image_object() {
            match capture_image_object(image_object) {
                Ok(Some(placement)) => images.push(placement),
                Ok(None) => {}
                Err(e) => {
                    warn!(page = page_number, error = ?e, "Skipping unreadable image object");
                }
            }
        }
    }

    (texts, images)
}

fn capture_text_object(
    object: &PdfPageObject,
    text_object: &PdfPageTextObject,
) -> Result<Option<RawTextFragment>, PdfiumError> {
    let text = text_object.text();
    if text.trim().is_empty() {
        return Ok(None);
    }

    // Tight run box spanning the descent/ascent extents of the glyphs.
    let bounds = object.bounds()?;
    let left = bounds.left().value;
    let bottom = bounds.bottom().value;
    let bbox = RawBox {
        left,
        bottom,
        width: bounds.right().value - left,
        height: bounds.top().value - bottom,
    };
    if bbox.width <= 0.0 || bbox.height <= 0.0 {
        return Ok(None);
    }

    let font = text_object.font();
    let font_name = font.family();
    let (bold, italic) = style_flags(&font_name);

    let color = object
        .fill_color()
        .map(|c| {
            [
                c.red() as f32 / 255.0,
                c.green() as f32 / 255.0,
                c.blue() as f32 / 255.0,
            ]
        })
        .unwrap_or([0.0, 0.0, 0.0]);

    let invisible = matches!(
        text_object.render_mode(),
        PdfPageTextRenderMode::Invisible
    );

    Ok(Some(RawTextFragment {
        text,
        bbox,
        style: StyleInfo {
            font_name,
            font_size: text_object.scaled_font_size().value,
            color,
            bold,
            italic,
        },
        invisible,
    }))
}

fn capture_image_object(
    image_object: &PdfPageImageObject,
) -> Result<Option<RawImagePlacement>, PdfiumError> {
    // Placement from the current transform: the box dimensions are the
    // vector norms of the matrix basis vectors, the origin its translation.
    let matrix = image_object.matrix()?;
    let width = (matrix.a() * matrix.a() + matrix.b() * matrix.b()).sqrt();
    let height = (matrix.c() * matrix.c() + matrix.d() * matrix.d()).sqrt();
    if width <= 0.0 || height <= 0.0 {
        return Ok(None);
    }

    let decoded = image_object.get_raw_image()?;
    let rgba = decoded.to_rgba8();
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|_| PdfiumError::ImageError)?;

    Ok(Some(RawImagePlacement {
        bytes,
        mime_type: "image/png".to_string(),
        bbox: RawBox {
            left: matrix.e(),
            bottom: matrix.f(),
            width,
            height,
        },
    }))
}

/// Bold/italic flags from the font name. PDF font programs rarely expose
/// reliable style bits, but subsetted names almost always carry them.
fn style_flags(font_name: &str) -> (bool, bool) {
    let lower = font_name.to_lowercase();
    let bold = lower.contains("bold") || lower.contains("black") || lower.contains("heavy");
    let italic = lower.contains("italic") || lower.contains("oblique");
    (bold, italic)
}
