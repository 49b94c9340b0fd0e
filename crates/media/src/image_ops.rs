//! Image normalization for stored uploads.
//!
//! Slips and meter photos arrive at phone-camera resolution; anything wider
//! than the limit is downscaled and re-encoded as JPEG before it is written
//! to disk. Failures fall back to the original bytes, a stored original is
//! always better than a lost upload.

use std::io::Cursor;

use {
    image::{GenericImageView, ImageFormat, ImageReader},
    tracing::warn,
};

use crate::{Result, error::Error};

/// Width cap applied to stored uploads.
pub const DEFAULT_MAX_WIDTH: u32 = 1280;

/// JPEG quality for re-encoded uploads.
const JPEG_QUALITY: u8 = 85;

/// Downscale to `max_width` (aspect preserved) and re-encode as JPEG.
/// Images at or under the cap pass through untouched.
pub fn normalize(data: &[u8], max_width: u32) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::message(format!("unreadable image: {e}")))?
        .decode()
        .map_err(|e| Error::message(format!("undecodable image: {e}")))?;

    let (width, height) = img.dimensions();
    if width <= max_width {
        return Ok(data.to_vec());
    }

    let ratio = f64::from(max_width) / f64::from(width);
    let new_height = (f64::from(height) * ratio).round() as u32;
    let resized = img.resize(max_width, new_height, image::imageops::FilterType::Lanczos3);

    let mut output = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
    resized
        .write_with_encoder(encoder)
        .map_err(|e| Error::message(format!("jpeg encode failed: {e}")))?;
    Ok(output.into_inner())
}

/// [`normalize`], but never fails: on any processing error the original
/// bytes are kept and the error is logged.
#[must_use]
pub fn normalize_best_effort(data: Vec<u8>, max_width: u32) -> Vec<u8> {
    match normalize(&data, max_width) {
        Ok(processed) => processed,
        Err(e) => {
            warn!(error = %e, "image normalization failed, storing original");
            data
        },
    }
}

/// File extension for the stored copy, guessed from the bytes.
#[must_use]
pub fn extension_for(data: &[u8]) -> &'static str {
    let format = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()
        .and_then(|r| r.format());
    match format {
        Some(ImageFormat::Png) => "png",
        Some(ImageFormat::WebP) => "webp",
        _ => "jpg",
    }
}
