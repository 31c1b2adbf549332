//! Image encoding: `DynamicImage` → grayscale PNG bytes for Tesseract.
//!
//! PNG is lossless; JPEG ringing around thin matras and the horizontal
//! shirorekha line measurably hurts Devanagari recognition. Tesseract
//! binarises internally, so we hand it 8-bit luma and skip the alpha and
//! colour channels pdfium produces.

use crate::error::KoshaError;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a grayscale PNG.
pub fn encode_png(img: &DynamicImage, page_num: usize) -> Result<Vec<u8>, KoshaError> {
    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let mut buf = Vec::new();
    gray.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| KoshaError::RasterisationFailed {
            page: page_num,
            detail: format!("PNG encoding failed: {e}"),
        })?;
    debug!("Encoded page {} → {} bytes PNG", page_num, buf.len());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img, 1).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).expect("valid PNG");
        assert_eq!(decoded.width(), 10);
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }
}
