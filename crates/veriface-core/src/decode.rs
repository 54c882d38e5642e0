//! Image decoding: inbound bytes to a `NormalizedImage`.
//!
//! The decoder owns input validation (byte budget, pixel dimensions, format
//! sniffing) and channel normalization to RGB. It never resizes; each model
//! applies its own deterministic geometry downstream.

use thiserror::Error;

use crate::types::NormalizedImage;

/// Input limits enforced before and during decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    /// Maximum accepted encoded payload size in bytes.
    pub max_bytes: usize,
    /// Maximum accepted width or height in pixels.
    pub max_dimension: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self { max_bytes: 10 * 1024 * 1024, max_dimension: 4096 }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,

    #[error("image payload is {actual} bytes, limit is {limit}")]
    TooLarge { actual: usize, limit: usize },

    #[error("image dimensions {width}x{height} exceed limit of {limit}")]
    DimensionsExceeded { width: u32, height: u32, limit: u32 },

    #[error("unsupported or corrupt image data: {0}")]
    Format(#[from] image::ImageError),
}

/// Decodes encoded image bytes (PNG, JPEG, and the other formats the `image`
/// crate sniffs) into an RGB `NormalizedImage`.
pub fn decode_image(bytes: &[u8], limits: &DecodeLimits) -> Result<NormalizedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > limits.max_bytes {
        return Err(DecodeError::TooLarge { actual: bytes.len(), limit: limits.max_bytes });
    }

    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();

    if width > limits.max_dimension || height > limits.max_dimension {
        return Err(DecodeError::DimensionsExceeded {
            width,
            height,
            limit: limits.max_dimension,
        });
    }

    // Zero-sized images do not survive the image crate's own parsing, but the
    // NormalizedImage invariant is checked here rather than assumed.
    NormalizedImage::from_rgb(width, height, rgb.into_raw()).ok_or(DecodeError::Empty)
}
