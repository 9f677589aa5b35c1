//! Image encoding for the fallback stages.
//!
//! Vision APIs take base64 data-URIs in the request body; PNG keeps the
//! rendered text crisp, and `detail: "high"` makes GPT-4-class models spend
//! their full tile budget, which dense price tables need.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as a base64 PNG attachment.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(png_bytes(img)?);
    debug!("encoded image, {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Raw PNG bytes for OCR engines that take an image buffer.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Split a page image into top and bottom halves.
///
/// Used when a page keeps timing out: half the content per request halves
/// the response size. The bottom half takes the extra row on odd heights so
/// the two crops tile the page exactly.
pub fn split_page_image(img: &DynamicImage) -> (DynamicImage, DynamicImage) {
    let (w, h) = (img.width(), img.height());
    let half = h / 2;
    let top = img.crop_imm(0, 0, w, half);
    let bottom = img.crop_imm(0, half, w, h - half);
    (top, bottom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(!decoded.is_empty());
    }

    #[test]
    fn split_covers_whole_page() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 31, Rgba([0, 0, 0, 255])));
        let (top, bottom) = split_page_image(&img);
        assert_eq!(top.width(), 20);
        assert_eq!(bottom.width(), 20);
        assert_eq!(top.height() + bottom.height(), 31);
        assert_eq!(top.height(), 15);
    }
}
