use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use veriface_core::{
    Embedding, Extractor, ExtractorError, FaceRegion, Locator, LocatorError, NormalizedImage,
};

use crate::health::HealthState;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("locator error: {0}")]
    Locator(#[from] LocatorError),
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("inference thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the detection thread.
struct DetectRequest {
    image: Arc<NormalizedImage>,
    reply: oneshot::Sender<Result<Vec<FaceRegion>, EngineError>>,
}

/// Messages sent from HTTP handlers to the embedding thread.
struct ExtractRequest {
    image: Arc<NormalizedImage>,
    region: FaceRegion,
    reply: oneshot::Sender<Result<Embedding, EngineError>>,
}

/// Clone-safe handle to the inference threads.
///
/// Each ONNX session lives on its own OS thread and processes one request
/// at a time; detection and extraction queue independently so neither model
/// blocks the other.
#[derive(Clone)]
pub struct EngineHandle {
    detect_tx: mpsc::Sender<DetectRequest>,
    extract_tx: mpsc::Sender<ExtractRequest>,
}

impl EngineHandle {
    /// Request face detection on a decoded image.
    pub async fn detect(&self, image: Arc<NormalizedImage>) -> Result<Vec<FaceRegion>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.detect_tx
            .send(DetectRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request an embedding for one detected face region.
    pub async fn extract(
        &self,
        image: Arc<NormalizedImage>,
        region: FaceRegion,
    ) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.extract_tx
            .send(ExtractRequest {
                image,
                region,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn both inference threads.
///
/// Model loading happens on the threads themselves so the HTTP listener can
/// come up and report `starting` meanwhile. Once both models are loaded the
/// health state flips to ready; if either load fails it flips to degraded
/// and requests to that thread report `ChannelClosed`.
pub fn spawn_engine<L, X, FL, FX>(
    make_locator: FL,
    make_extractor: FX,
    health: HealthState,
) -> EngineHandle
where
    L: Locator + 'static,
    X: Extractor + 'static,
    FL: FnOnce() -> anyhow::Result<L> + Send + 'static,
    FX: FnOnce() -> anyhow::Result<X> + Send + 'static,
{
    let (detect_tx, mut detect_rx) = mpsc::channel::<DetectRequest>(4);
    let (extract_tx, mut extract_rx) = mpsc::channel::<ExtractRequest>(4);

    let loaded = Arc::new(AtomicUsize::new(0));

    {
        let health = health.clone();
        let loaded = loaded.clone();
        std::thread::Builder::new()
            .name("veriface-detect".into())
            .spawn(move || {
                let started = Instant::now();
                let mut locator = match make_locator() {
                    Ok(locator) => locator,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to load detection model");
                        health.mark_degraded();
                        return;
                    }
                };
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "detection model loaded"
                );
                if loaded.fetch_add(1, Ordering::AcqRel) + 1 == 2 {
                    health.mark_ready();
                }
                while let Some(req) = detect_rx.blocking_recv() {
                    let result = locator.locate(&req.image).map_err(EngineError::from);
                    let _ = req.reply.send(result);
                }
                tracing::info!("detection thread exiting");
            })
            .expect("failed to spawn detection thread");
    }

    std::thread::Builder::new()
        .name("veriface-embed".into())
        .spawn(move || {
            let started = Instant::now();
            let mut extractor = match make_extractor() {
                Ok(extractor) => extractor,
                Err(err) => {
                    tracing::error!(error = %err, "failed to load embedding model");
                    health.mark_degraded();
                    return;
                }
            };
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                model_version = extractor.model_version(),
                "embedding model loaded"
            );
            if loaded.fetch_add(1, Ordering::AcqRel) + 1 == 2 {
                health.mark_ready();
            }
            while let Some(req) = extract_rx.blocking_recv() {
                let result = extractor
                    .extract(&req.image, &req.region)
                    .map_err(EngineError::from);
                let _ = req.reply.send(result);
            }
            tracing::info!("embedding thread exiting");
        })
        .expect("failed to spawn embedding thread");

    EngineHandle {
        detect_tx,
        extract_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use std::time::Duration;

    struct FixedLocator {
        regions: Vec<FaceRegion>,
    }

    impl Locator for FixedLocator {
        fn locate(&mut self, _image: &NormalizedImage) -> Result<Vec<FaceRegion>, LocatorError> {
            Ok(self.regions.clone())
        }
    }

    struct FixedExtractor;

    impl Extractor for FixedExtractor {
        fn extract(
            &mut self,
            _image: &NormalizedImage,
            region: &FaceRegion,
        ) -> Result<Embedding, ExtractorError> {
            Ok(Embedding {
                values: vec![region.confidence, 0.0],
                model_version: "stub".to_string(),
            })
        }

        fn model_version(&self) -> &str {
            "stub"
        }
    }

    fn test_image() -> Arc<NormalizedImage> {
        Arc::new(NormalizedImage::from_rgb(2, 2, vec![0; 12]).unwrap())
    }

    fn test_region(confidence: f32) -> FaceRegion {
        FaceRegion {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
            confidence,
            landmarks: None,
        }
    }

    async fn wait_for(health: &HealthState, status: HealthStatus) {
        for _ in 0..200 {
            if health.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("health never reached {status:?}");
    }

    #[tokio::test]
    async fn test_spawn_marks_ready_once_both_models_load() {
        let health = HealthState::new();
        let _engine = spawn_engine(
            || Ok(FixedLocator { regions: vec![] }),
            || Ok(FixedExtractor),
            health.clone(),
        );
        wait_for(&health, HealthStatus::Ready).await;
    }

    #[tokio::test]
    async fn test_detect_round_trip() {
        let health = HealthState::new();
        let engine = spawn_engine(
            || {
                Ok(FixedLocator {
                    regions: vec![test_region(0.9)],
                })
            },
            || Ok(FixedExtractor),
            health.clone(),
        );
        wait_for(&health, HealthStatus::Ready).await;

        let regions = engine.detect(test_image()).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_extract_round_trip() {
        let health = HealthState::new();
        let engine = spawn_engine(
            || Ok(FixedLocator { regions: vec![] }),
            || Ok(FixedExtractor),
            health.clone(),
        );
        wait_for(&health, HealthStatus::Ready).await;

        let embedding = engine
            .extract(test_image(), test_region(0.75))
            .await
            .unwrap();
        assert_eq!(embedding.values, vec![0.75, 0.0]);
        assert_eq!(embedding.model_version, "stub");
    }

    #[tokio::test]
    async fn test_failed_load_degrades_and_closes_channel() {
        let health = HealthState::new();
        let engine = spawn_engine(
            || Err::<FixedLocator, _>(anyhow::anyhow!("model file missing")),
            || Ok(FixedExtractor),
            health.clone(),
        );
        wait_for(&health, HealthStatus::Degraded).await;

        let err = engine.detect(test_image()).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
