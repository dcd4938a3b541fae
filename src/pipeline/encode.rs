//! Image encoding: figure bytes from the bundle → base64 `ImageData`.
//!
//! Figures arrive as whatever the conversion service extracted (JPEG in
//! practice). Formats the vision APIs accept are passed through untouched;
//! anything else is decoded and re-encoded as PNG.
//! `detail: "high"` keeps small axis labels and legends legible to the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// Formats sent as-is.
const PASSTHROUGH: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Bytes plus MIME type, ready to attach to a vision request.
pub fn prepare_image(bytes: &[u8]) -> Result<(Vec<u8>, &'static str), image::ImageError> {
    match image::guess_format(bytes) {
        Ok(format) if PASSTHROUGH.contains(&format) => Ok((bytes.to_vec(), format.to_mime_type())),
        _ => {
            let img = image::load_from_memory(bytes)?;
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            debug!("Re-encoded figure as PNG ({} → {} bytes)", bytes.len(), buf.len());
            Ok((buf, ImageFormat::Png.to_mime_type()))
        }
    }
}

/// Wrap prepared bytes for the provider.
pub fn encode_image(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn png_passes_through() {
        let png = png_bytes();
        let (bytes, mime) = prepare_image(&png).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, png);
    }

    #[test]
    fn jpeg_magic_is_recognised() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));
        let mut jpg = Vec::new();
        img.to_rgb8()
            .write_to(&mut Cursor::new(&mut jpg), ImageFormat::Jpeg)
            .unwrap();
        let (_, mime) = prepare_image(&jpg).unwrap();
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(prepare_image(b"definitely not an image").is_err());
    }

    #[test]
    fn encode_is_valid_base64() {
        let png = png_bytes();
        let data = encode_image(&png, "image/png");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), png);
    }
}
