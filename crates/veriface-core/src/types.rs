use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Decoded image pixels in row-major interleaved RGB order.
///
/// Invariant: `width > 0`, `height > 0`, and the pixel buffer holds exactly
/// `width * height * 3` bytes. Constructed by the decoder; everything
/// downstream (detection, alignment, fingerprinting) reads it immutably.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl NormalizedImage {
    pub const CHANNELS: usize = 3;

    /// Builds an image from an RGB8 buffer. Returns `None` when either
    /// dimension is zero or the buffer length does not match.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if width == 0 || height == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB8 buffer, `width * height * 3` bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at (x, y). Caller must stay in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Content fingerprint: SHA-256 over dimensions and pixel bytes.
    ///
    /// Identical decoded pixels always produce the identical fingerprint,
    /// which is what makes it usable as an embedding cache key.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(&self.pixels);
        Fingerprint(hasher.finalize().into())
    }
}

/// Cache key derived from normalized image content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in original-image pixel space, clamped to image bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    /// Clamps the box (not the landmarks) into `[0, width] x [0, height]`.
    pub fn clamp_to(&mut self, width: u32, height: u32) {
        let max_x = width as f32;
        let max_y = height as f32;
        let x1 = (self.x + self.width).clamp(0.0, max_x);
        let y1 = (self.y + self.height).clamp(0.0, max_y);
        self.x = self.x.clamp(0.0, max_x);
        self.y = self.y.clamp(0.0, max_y);
        self.width = (x1 - self.x).max(0.0);
        self.height = (y1 - self.y).max(0.0);
    }
}

/// Face embedding vector (512-dimensional for ArcFace w600k_r50).
///
/// Immutable after extraction; values are L2-normalized by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: String,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// An enrolled gallery identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    /// RFC 3339 enrollment timestamp.
    pub enrolled_at: String,
}
