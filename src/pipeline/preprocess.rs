//! Bitmap normalisation ahead of recognition.
//!
//! Phone photos of site paperwork arrive at 12+ megapixels with uneven
//! lighting. Recognition is both faster and more accurate on a capped-size,
//! hard black-and-white bitmap, so every document goes through the same
//! four steps:
//!
//! 1. decode (PDFs are rasterised via [`super::render`])
//! 2. cap the long edge at `max_dimension`, keeping the aspect ratio
//! 3. grayscale with 0.299·R + 0.587·G + 0.114·B
//! 4. binarise at a fixed threshold, alpha untouched, then PNG-encode
//!
//! All of it is CPU-bound and runs under `spawn_blocking`.

use super::input::DocumentFile;
use super::render;
use crate::config::PipelineConfig;
use crate::error::SiteScanError;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// A normalised bitmap ready for the engine.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// Binarised RGBA bitmap.
    pub image: DynamicImage,
    /// The same bitmap, PNG-encoded.
    pub encoded_png: Vec<u8>,
    pub original_width: u32,
    pub original_height: u32,
}

impl PreprocessedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Normalise `file` (already validated, extension `ext`) on the blocking pool.
pub async fn preprocess(
    file: &DocumentFile,
    ext: &str,
    config: &PipelineConfig,
) -> Result<PreprocessedImage, SiteScanError> {
    let name = file.name.clone();
    let bytes = file.bytes.clone();
    let ext = ext.to_string();
    let max_dimension = config.max_dimension;
    let threshold = config.binarize_threshold;

    tokio::task::spawn_blocking(move || {
        preprocess_blocking(&name, &ext, &bytes, max_dimension, threshold)
    })
    .await
    .map_err(|e| SiteScanError::Internal(format!("Preprocess task panicked: {}", e)))?
}

/// Blocking implementation of [`preprocess`].
pub fn preprocess_blocking(
    name: &str,
    ext: &str,
    bytes: &[u8],
    max_dimension: u32,
    threshold: u8,
) -> Result<PreprocessedImage, SiteScanError> {
    let decoded = decode(name, ext, bytes, max_dimension)?;
    let (original_width, original_height) = (decoded.width(), decoded.height());

    let scaled = downscale(decoded, max_dimension);
    let binary = DynamicImage::ImageRgba8(binarize(&scaled, threshold));
    let encoded_png = encode_png(&binary).map_err(|e| SiteScanError::Internal(format!(
        "PNG encoding of '{}' failed: {}",
        name, e
    )))?;

    debug!(
        "Preprocessed '{}': {}x{} → {}x{}, {} bytes PNG",
        name,
        original_width,
        original_height,
        binary.width(),
        binary.height(),
        encoded_png.len()
    );

    Ok(PreprocessedImage {
        image: binary,
        encoded_png,
        original_width,
        original_height,
    })
}

/// Decode raw bytes into a bitmap. PDFs are rasterised, anything else is
/// decoded by content sniffing.
pub fn decode(
    name: &str,
    ext: &str,
    bytes: &[u8],
    max_dimension: u32,
) -> Result<DynamicImage, SiteScanError> {
    if ext.eq_ignore_ascii_case("pdf") {
        return render::rasterise_first_page(name, bytes, max_dimension);
    }
    image::load_from_memory(bytes).map_err(|e| SiteScanError::Decode {
        file: name.to_string(),
        detail: e.to_string(),
    })
}

/// Dimensions after capping the long edge at `max`, aspect ratio preserved.
pub fn target_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale_other = |other: u32, longest: u32| -> u32 {
        ((other as f64 * max as f64 / longest as f64).round() as u32).max(1)
    };
    if width >= height {
        (max, scale_other(height, width))
    } else {
        (scale_other(width, height), max)
    }
}

/// Shrink `img` so neither side exceeds `max`. Never enlarges.
pub fn downscale(img: DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let (tw, th) = target_dimensions(w, h, max);
    if (tw, th) == (w, h) {
        return img;
    }
    img.resize_exact(tw, th, FilterType::Triangle)
}

/// Luminance of one RGB triple.
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Hard black/white conversion: R, G and B become 0 or 255 depending on the
/// pixel's luminance; alpha is copied through.
pub fn binarize(img: &DynamicImage, threshold: u8) -> RgbaImage {
    let mut rgba = img.to_rgba8();
    let cut = threshold as f32;
    for pixel in rgba.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let v = if luminance(r, g, b) >= cut { 255 } else { 0 };
        pixel.0[0] = v;
        pixel.0[1] = v;
        pixel.0[2] = v;
    }
    rgba
}

/// Lossless PNG encoding.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_bytes(w: u32, h: u32, px: Rgba<u8>) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, px));
        encode_png(&img).unwrap()
    }

    #[test]
    fn small_images_are_untouched() {
        assert_eq!(target_dimensions(800, 600, 2000), (800, 600));
        assert_eq!(target_dimensions(2000, 2000, 2000), (2000, 2000));
    }

    #[test]
    fn long_axis_is_capped_exactly() {
        assert_eq!(target_dimensions(4000, 1000, 2000), (2000, 500));
        assert_eq!(target_dimensions(1000, 4000, 2000), (500, 2000));
        let (w, h) = target_dimensions(3000, 2001, 2000);
        assert_eq!(w, 2000);
        let ratio_in = 3000.0 / 2001.0;
        let ratio_out = w as f64 / h as f64;
        assert!((ratio_in - ratio_out).abs() < 0.01, "{ratio_in} vs {ratio_out}");
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(target_dimensions(10_000, 1, 2000), (2000, 1));
    }

    #[test]
    fn downscale_resizes_large_bitmap() {
        let img = DynamicImage::new_rgba8(2400, 1200);
        let out = downscale(img, 2000);
        assert_eq!((out.width(), out.height()), (2000, 1000));
    }

    #[test]
    fn luminance_weights() {
        assert!((luminance(255, 0, 0) - 76.245).abs() < 1e-3);
        assert!((luminance(0, 255, 0) - 149.685).abs() < 1e-3);
        assert!((luminance(0, 0, 255) - 29.07).abs() < 1e-3);
    }

    #[test]
    fn binarize_thresholds_and_keeps_alpha() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([200, 200, 200, 40]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255])); // 149.7 → white
        img.put_pixel(2, 0, Rgba([255, 0, 0, 128])); // 76.2 → black
        let out = binarize(&DynamicImage::ImageRgba8(img), 128);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 40]);
        assert_eq!(out.get_pixel(1, 0).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(2, 0).0, [0, 0, 0, 128]);
    }

    #[test]
    fn full_pass_on_png() {
        let bytes = png_bytes(4000, 3000, Rgba([30, 30, 30, 255]));
        let out = preprocess_blocking("scan.png", "png", &bytes, 2000, 128).unwrap();
        assert_eq!((out.original_width, out.original_height), (4000, 3000));
        assert_eq!((out.width(), out.height()), (2000, 1500));
        assert_eq!(&out.encoded_png[1..4], b"PNG");
        assert_eq!(out.image.to_rgba8().get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = preprocess_blocking("scan.jpg", "jpg", b"definitely not a jpeg", 2000, 128)
            .unwrap_err();
        assert!(matches!(err, SiteScanError::Decode { .. }));
    }
}
