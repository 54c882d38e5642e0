//! veriface-core — Face detection, embedding extraction, and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for embedding extraction, both
//! running via ONNX Runtime for CPU inference. Matching is distance-based
//! against a configurable threshold.

pub mod alignment;
pub mod decode;
pub mod extractor;
pub mod locator;
pub mod matcher;
pub mod types;

pub use decode::{decode_image, DecodeError, DecodeLimits};
pub use extractor::{EmbeddingExtractor, Extractor, ExtractorError};
pub use locator::{FaceLocator, Locator, LocatorError};
pub use matcher::{compare, identify, DistanceMetric, MatchPolicy, MatchResult, MatcherError};
pub use types::{Embedding, FaceRegion, Fingerprint, KnownFace, NormalizedImage};
