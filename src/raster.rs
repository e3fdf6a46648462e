use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};

pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

// ── Data URL handling ────────────────────────────────────────────────────────

/// Decode the payload of a base64 data URL. `None` for anything that is not
/// a well-formed `data:<mime>;base64,<payload>` string.
pub fn parse_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, payload) = url.split_once(',')?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

// ── PNG serialization ────────────────────────────────────────────────────────

/// Serialize an RGBA buffer as a PNG data URL.
pub fn encode_png_data_url(buf: RgbaImage) -> Result<String, image::ImageError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(buf).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(&bytes)))
}

pub fn decode(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes).ok()
}

/// Redraw decoded source pixels onto a fresh buffer of the source's natural
/// dimensions and serialize that buffer. Mirrors drawing an image element
/// onto an off-screen canvas before reading it back.
pub fn rasterize_to_data_url(decoded: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = RgbaImage::new(decoded.width(), decoded.height());
    image::imageops::overlay(&mut buf, &decoded.to_rgba8(), 0, 0);
    encode_png_data_url(buf)
}

/// Serialization of a drawing canvas with no captured backing bitmap: a
/// blank, fully transparent buffer of the canvas's declared size.
pub fn blank_canvas_data_url(width: u32, height: u32) -> Result<String, image::ImageError> {
    encode_png_data_url(RgbaImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_png_data_url(width: u32, height: u32, rgba: [u8; 4]) -> String {
        encode_png_data_url(RgbaImage::from_pixel(width, height, Rgba(rgba))).unwrap()
    }

    #[test]
    fn data_url_round_trip() {
        let url = solid_png_data_url(8, 8, [10, 20, 30, 255]);
        assert!(url.starts_with(PNG_DATA_URL_PREFIX));
        let bytes = parse_data_url(&url).unwrap();
        let img = decode(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[test]
    fn parse_rejects_non_data_urls() {
        assert!(parse_data_url("https://example.com/a.png").is_none());
        assert!(parse_data_url("data:image/png,not-base64-flagged").is_none());
        assert!(parse_data_url("data:image/png;base64,@@@").is_none());
        assert!(parse_data_url("").is_none());
    }

    #[test]
    fn rasterize_keeps_natural_dimensions_and_pixels() {
        let url = solid_png_data_url(5, 3, [200, 100, 0, 255]);
        let decoded = decode(&parse_data_url(&url).unwrap()).unwrap();
        let redrawn = rasterize_to_data_url(&decoded).unwrap();
        let out = decode(&parse_data_url(&redrawn).unwrap()).unwrap();
        assert_eq!((out.width(), out.height()), (5, 3));
        assert_eq!(out.to_rgba8().get_pixel(2, 1).0, [200, 100, 0, 255]);
    }

    #[test]
    fn blank_canvas_is_transparent() {
        let url = blank_canvas_data_url(4, 6).unwrap();
        let out = decode(&parse_data_url(&url).unwrap()).unwrap();
        assert_eq!((out.width(), out.height()), (4, 6));
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn zero_width_buffer_does_not_encode() {
        assert!(blank_canvas_data_url(0, 5).is_err());
    }
}
