//! PDFium access: library binding, document loading, and single-page
//! payload capture.

use std::path::Path;

use pdfium_render::prelude::*;

use crate::error::ExtractError;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ExtractError::PdfiumBinding {
            message: format!("{e:?}"),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Load the source document.
pub fn load_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ExtractError::DocumentLoad {
            message: format!("{e:?}"),
        })
}

/// Copy one page into a standalone single-page document and return its
/// serialized bytes. Used both for provider grounding uploads and OCR
/// payloads.
pub fn single_page_payload(
    pdfium: &Pdfium,
    source: &PdfDocument,
    page_index: u16,
    page_number: u16,
) -> Result<Vec<u8>, ExtractError> {
    let payload_err = |e: PdfiumError| ExtractError::PagePayload {
        page: page_number,
        message: format!("{e:?}"),
    };

    let mut payload = pdfium.create_new_pdf().map_err(payload_err)?;
    payload
        .pages_mut()
        .copy_page_from_document(source, page_index, 0)
        .map_err(payload_err)?;
    payload.save_to_bytes().map_err(payload_err)
}
