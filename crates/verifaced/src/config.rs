use std::path::PathBuf;
use std::time::Duration;

use veriface_core::{DecodeLimits, DistanceMetric, MatchPolicy};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_IMAGE_DIM: u32 = 4096;
const DEFAULT_INTRA_THREADS: usize = 2;
const DEFAULT_COOLDOWN_MINUTES: u64 = 30;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the HTTP listener binds to.
    pub port: u16,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Distance metric used for matching.
    pub match_metric: DistanceMetric,
    /// Distance at or below which two faces count as the same person.
    pub distance_threshold: f32,
    /// Wall-clock budget in seconds for a single inference request.
    pub request_timeout_secs: u64,
    /// Maximum number of cached embeddings.
    pub cache_capacity: usize,
    /// Seconds a cached embedding stays valid.
    pub cache_ttl_secs: u64,
    /// Largest accepted image payload in bytes.
    pub max_image_bytes: usize,
    /// Largest accepted image width or height in pixels.
    pub max_image_dim: u32,
    /// Intra-op thread count per ONNX session.
    pub intra_threads: usize,
    /// Minutes before the same person can log attendance again.
    pub cooldown_minutes: u64,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            port: env_u16("VERIFACE_PORT", DEFAULT_PORT),
            model_dir: std::env::var("VERIFACE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_DIR)),
            match_metric: std::env::var("VERIFACE_MATCH_METRIC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DistanceMetric::Cosine),
            distance_threshold: env_f32("VERIFACE_DISTANCE_THRESHOLD", DEFAULT_DISTANCE_THRESHOLD),
            request_timeout_secs: env_u64("VERIFACE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_capacity: env_usize("VERIFACE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            cache_ttl_secs: env_u64("VERIFACE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            max_image_bytes: env_usize("VERIFACE_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            max_image_dim: env_u32("VERIFACE_MAX_IMAGE_DIM", DEFAULT_MAX_IMAGE_DIM),
            intra_threads: env_usize("VERIFACE_INTRA_THREADS", DEFAULT_INTRA_THREADS),
            cooldown_minutes: env_u64("VERIFACE_COOLDOWN_MINUTES", DEFAULT_COOLDOWN_MINUTES),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            metric: self.match_metric,
            threshold: self.distance_threshold,
        }
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_bytes: self.max_image_bytes,
            max_dimension: self.max_image_dim,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            match_metric: DistanceMetric::Cosine,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_image_dim: DEFAULT_MAX_IMAGE_DIM,
            intra_threads: DEFAULT_INTRA_THREADS,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
