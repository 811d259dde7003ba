//! Scanned-PDF rasterisation via pdfium.
//!
//! A scanned PDF is a container around one or more page images; recognition
//! works on the first page. pdfium is bound at runtime, from the directory in
//! `PDFIUM_LIB_PATH` when set, otherwise from the system library path.
//!
//! pdfium keeps thread-local state and is not async-safe, so callers run
//! [`rasterise_first_page`] inside `spawn_blocking`.

use crate::error::SiteScanError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// Environment variable naming a directory that contains the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))?
        }
        _ => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

/// Render page 1 of the PDF in `bytes`, longest edge capped at `max_pixels`.
///
/// Blocking.
pub fn rasterise_first_page(
    file_name: &str,
    bytes: &[u8],
    max_pixels: u32,
) -> Result<DynamicImage, SiteScanError> {
    let decode_err = |detail: String| SiteScanError::Decode {
        file: file_name.to_string(),
        detail,
    };

    let pdfium = bind_pdfium().map_err(|e| decode_err(format!("pdfium unavailable: {:?}", e)))?;
    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            decode_err("PDF is password protected".into())
        } else {
            decode_err(format!("corrupt PDF: {}", err_str))
        }
    })?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(decode_err("PDF has no pages".into()));
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages
        .get(0)
        .map_err(|e| decode_err(format!("page 1: {:?}", e)))?;
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| decode_err(format!("page 1 render: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rasterised '{}' page 1 of {} → {}x{} px",
        file_name,
        pages.len(),
        image.width(),
        image.height()
    );
    Ok(image)
}
