//! Selfie preparation: dark-frame rejection, resize, JPEG re-encode, digest.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use sentinex_core::PreparedSelfie;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Bounding box the comparison service expects selfies to fit in.
pub const SELFIE_MAX_WIDTH: u32 = 300;
pub const SELFIE_MAX_HEIGHT: u32 = 400;
pub const SELFIE_JPEG_QUALITY: u8 = 80;

/// Fraction of near-black pixels above which a selfie is considered dark.
const DARK_PIXEL_FRACTION: f32 = 0.95;
const DARK_PIXEL_LEVEL: u8 = 32;

#[derive(Error, Debug)]
pub enum SelfieError {
    #[error("selfie is not a readable image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode selfie: {0}")]
    Encode(#[source] image::ImageError),
    #[error("selfie is too dark to compare; is the camera covered?")]
    TooDark,
}

/// True if more than `threshold_pct` of pixels fall in the darkest bucket.
fn is_dark(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < DARK_PIXEL_LEVEL).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

/// Decode an image of any supported format and prepare it for upload.
///
/// The result fits within 300x400 with aspect ratio preserved, is JPEG
/// encoded at quality 80, and carries the hex SHA-256 of the JPEG bytes.
pub fn prepare_selfie(bytes: &[u8]) -> Result<PreparedSelfie, SelfieError> {
    let img = image::load_from_memory(bytes).map_err(SelfieError::Decode)?;

    if is_dark(img.to_luma8().as_raw(), DARK_PIXEL_FRACTION) {
        return Err(SelfieError::TooDark);
    }

    let resized = img
        .resize(SELFIE_MAX_WIDTH, SELFIE_MAX_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, SELFIE_JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(SelfieError::Encode)?;

    let digest = format!("{:x}", Sha256::digest(&jpeg));

    tracing::debug!(
        source_width = img.width(),
        source_height = img.height(),
        width = resized.width(),
        height = resized.height(),
        bytes = jpeg.len(),
        digest = %digest,
        "selfie prepared"
    );

    Ok(PreparedSelfie {
        width: resized.width(),
        height: resized.height(),
        jpeg,
        digest,
    })
}
