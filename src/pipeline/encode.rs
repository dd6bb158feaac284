//! Image encoding: rendered page → base64 JPEG [`ImagePayload`].
//!
//! Contract scans are mostly black text on white paper; JPEG at quality 80
//! keeps glyph edges readable for the model at a fraction of PNG's size,
//! which matters when three pages travel in one request.

use crate::model::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode a rendered page as a base64 JPEG.
///
/// Alpha is dropped first; JPEG has no alpha channel.
pub fn encode_page(img: &DynamicImage, quality: u8) -> Result<ImagePayload, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        rgb.width(),
        rgb.height(),
        b64.len()
    );

    Ok(ImagePayload::new(b64, "image/jpeg"))
}

/// Wrap already-compressed image bytes without re-encoding them.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> ImagePayload {
    ImagePayload::new(STANDARD.encode(bytes), mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img, 80).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn lower_quality_is_not_larger() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8, 255])
        }));
        let high = encode_page(&img, 95).unwrap();
        let low = encode_page(&img, 20).unwrap();
        assert!(low.data.len() <= high.data.len());
    }

    #[test]
    fn raw_bytes_keep_their_mime() {
        let p = encode_bytes(&[1, 2, 3], "image/png");
        assert_eq!(p.mime_type, "image/png");
        assert_eq!(p.data, "AQID");
    }
}
