//! Request orchestration: decode, detect, embed.
//!
//! A probe walks one image through the full pipeline. Decoding runs on the
//! blocking pool, inference on the engine threads, and extraction goes
//! through the embedding cache so repeated submissions of the same image
//! skip the embedding model entirely.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use veriface_core::{
    decode_image, DecodeError, DecodeLimits, Embedding, FaceRegion, Fingerprint, NormalizedImage,
};

use crate::cache::EmbeddingCache;
use crate::engine::{EngineError, EngineHandle};
use crate::health::{HealthState, HealthStatus};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{count} faces detected where exactly one is required")]
    MultipleFaces { count: usize },
    #[error("models are not ready (status: {status})")]
    ModelUnavailable { status: HealthStatus },
    #[error("request exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

/// Everything the pipeline learned about the primary face of one image.
#[derive(Debug)]
pub struct Probe {
    pub embedding: Embedding,
    pub region: FaceRegion,
    pub face_count: usize,
    pub fingerprint: Fingerprint,
}

#[derive(Clone)]
pub struct Pipeline {
    engine: EngineHandle,
    cache: EmbeddingCache<EngineError>,
    health: HealthState,
    limits: DecodeLimits,
    budget: Duration,
}

impl Pipeline {
    pub fn new(
        engine: EngineHandle,
        cache: EmbeddingCache<EngineError>,
        health: HealthState,
        limits: DecodeLimits,
        budget: Duration,
    ) -> Self {
        Self {
            engine,
            cache,
            health,
            limits,
            budget,
        }
    }

    /// Wall-clock budget for one request.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Decode an image and run detection only. An image with no faces is a
    /// valid result here, not an error.
    pub async fn detect(&self, bytes: Vec<u8>) -> Result<Vec<FaceRegion>, PipelineError> {
        self.check_ready()?;
        let image = self.decode(bytes).await?;
        let regions = self.engine.detect(image).await?;
        tracing::debug!(faces = regions.len(), "detection complete");
        Ok(regions)
    }

    /// Full probe of the primary face. When several faces are present the
    /// highest-confidence one is used.
    pub async fn probe(&self, bytes: Vec<u8>) -> Result<Probe, PipelineError> {
        self.probe_inner(bytes, false).await
    }

    /// Full probe that insists on exactly one face in the image.
    pub async fn probe_single(&self, bytes: Vec<u8>) -> Result<Probe, PipelineError> {
        self.probe_inner(bytes, true).await
    }

    async fn probe_inner(&self, bytes: Vec<u8>, single: bool) -> Result<Probe, PipelineError> {
        self.check_ready()?;
        let image = self.decode(bytes).await?;
        let fingerprint = image.fingerprint();

        let regions = self.engine.detect(image.clone()).await?;
        let face_count = regions.len();
        tracing::debug!(faces = face_count, fingerprint = %fingerprint, "detection complete");
        if face_count == 0 {
            return Err(PipelineError::NoFaceDetected);
        }
        if single && face_count > 1 {
            return Err(PipelineError::MultipleFaces { count: face_count });
        }
        // Regions arrive ordered by confidence, so the primary face is first.
        let region = regions[0].clone();

        let embedding = {
            let engine = self.engine.clone();
            let image = image.clone();
            let flight_region = region.clone();
            self.cache
                .get_or_compute(fingerprint, move || async move {
                    engine.extract(image, flight_region).await
                })
                .await
                .map_err(|err| PipelineError::Internal(err.to_string()))?
        };
        tracing::debug!(
            dim = embedding.dim(),
            model_version = %embedding.model_version,
            "embedding ready"
        );

        Ok(Probe {
            embedding,
            region,
            face_count,
            fingerprint,
        })
    }

    fn check_ready(&self) -> Result<(), PipelineError> {
        let status = self.health.status();
        if status != HealthStatus::Ready {
            return Err(PipelineError::ModelUnavailable { status });
        }
        Ok(())
    }

    async fn decode(&self, bytes: Vec<u8>) -> Result<Arc<NormalizedImage>, PipelineError> {
        let limits = self.limits;
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes, &limits))
            .await
            .map_err(|err| PipelineError::Internal(format!("decode task failed: {err}")))??;
        tracing::debug!(width = image.width(), height = image.height(), "image decoded");
        Ok(Arc::new(image))
    }
}

/// Runs `fut` under the given wall-clock budget, converting overruns into
/// `PipelineError::Timeout`. Abandoned work unwinds on its own; a cache
/// flight that was already started stays available to later callers.
pub async fn with_budget<T>(
    budget: Duration,
    fut: impl std::future::Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            budget_ms: budget.as_millis() as u64,
        }),
    }
}
