//! ArcFace embedding extractor via ONNX Runtime.
//!
//! Maps aligned 112x112 face crops to 512-dimensional L2-normalized
//! embeddings using the w600k_r50 ArcFace model.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::alignment;
use crate::types::{Embedding, FaceRegion, NormalizedImage};

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // NOT 128.0, ArcFace uses symmetric normalization
const ARCFACE_EMBEDDING_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("embedding model not found: {0} (fetch w600k_r50.onnx from the insightface model zoo)")]
    ModelNotFound(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Seam between the pipeline and the concrete embedding model.
pub trait Extractor: Send {
    /// Produces the embedding for one face region of an image. Deterministic:
    /// identical image and region always yield the identical vector.
    fn extract(
        &mut self,
        image: &NormalizedImage,
        region: &FaceRegion,
    ) -> Result<Embedding, ExtractorError>;

    /// Version tag stamped into every embedding this extractor produces.
    fn model_version(&self) -> &str;
}

/// ArcFace-based embedding extractor owning its ONNX session.
pub struct EmbeddingExtractor {
    session: Session,
}

impl EmbeddingExtractor {
    /// Loads the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Preprocesses a 112x112 RGB aligned crop into a NCHW float tensor in
    /// BGR channel order.
    fn preprocess(aligned: &[u8]) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let idx = (y * size + x) * 3;
                let r = aligned.get(idx).copied().unwrap_or(0) as f32;
                let g = aligned.get(idx + 1).copied().unwrap_or(0) as f32;
                let b = aligned.get(idx + 2).copied().unwrap_or(0) as f32;

                tensor[[0, 0, y, x]] = (b - ARCFACE_MEAN) / ARCFACE_STD;
                tensor[[0, 1, y, x]] = (g - ARCFACE_MEAN) / ARCFACE_STD;
                tensor[[0, 2, y, x]] = (r - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }

        tensor
    }
}

impl Extractor for EmbeddingExtractor {
    fn extract(
        &mut self,
        image: &NormalizedImage,
        region: &FaceRegion,
    ) -> Result<Embedding, ExtractorError> {
        let aligned = alignment::aligned_face_crop(image, region);
        let input = Self::preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::Inference(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(ExtractorError::Inference(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: ARCFACE_MODEL_VERSION.to_string(),
        })
    }

    fn model_version(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }
}

/// Scales a vector to unit L2 norm. Zero vectors pass through unchanged.
fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values
    }
}
