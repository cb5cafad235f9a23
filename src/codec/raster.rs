//! Raster decoding and PNG encoding

use image::{codecs::png::PngEncoder, ColorType, ImageEncoder, RgbImage};
use thiserror::Error;

use crate::codec::base64;
use crate::error::{AppError, Result};

/// Decoded in-memory raster, always 8-bit RGB
pub type Bitmap = RgbImage;

/// Raised when uploaded bytes are not a readable image
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DecodeError(String);

/// Decode any supported raster format into an RGB bitmap.
///
/// Alpha is dropped and grayscale is expanded, so callers always see three
/// channels regardless of the source encoding.
pub fn decode(bytes: &[u8]) -> std::result::Result<Bitmap, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError("empty upload".to_string()));
    }

    let image = image::load_from_memory(bytes).map_err(|e| DecodeError(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Decode an ordered sequence of uploads, naming the first failing index
pub fn decode_all(field: &str, payloads: &[Vec<u8>]) -> Result<Vec<Bitmap>> {
    payloads
        .iter()
        .enumerate()
        .map(|(index, bytes)| {
            decode(bytes).map_err(|e| {
                AppError::InvalidInput(format!("{}[{}] could not be decoded: {}", field, index, e))
            })
        })
        .collect()
}

/// Encode a bitmap as PNG bytes. Identical bitmaps give identical bytes.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            bitmap.as_raw(),
            bitmap.width(),
            bitmap.height(),
            ColorType::Rgb8,
        )
        .map_err(|e| AppError::Internal(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf)
}

/// Encode a bitmap as base64 PNG, ready for a `b64_json` field
pub fn encode(bitmap: &Bitmap) -> Result<String> {
    Ok(base64::encode(&encode_png(bitmap)?))
}
