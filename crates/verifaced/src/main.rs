use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use veriface_core::extractor::ARCFACE_MODEL_VERSION;
use veriface_core::{EmbeddingExtractor, FaceLocator};
use verifaced::config::Config;
use verifaced::engine::spawn_engine;
use verifaced::gallery::MemoryGallery;
use verifaced::health::HealthState;
use verifaced::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        model_dir = %config.model_dir.display(),
        metric = %config.match_metric,
        threshold = config.distance_threshold,
        "verifaced starting"
    );

    let health = HealthState::new();
    let scrfd_path = config.scrfd_model_path();
    let arcface_path = config.arcface_model_path();
    let intra_threads = config.intra_threads;
    let engine = spawn_engine(
        move || {
            FaceLocator::load(Path::new(&scrfd_path), intra_threads).map_err(anyhow::Error::from)
        },
        move || {
            EmbeddingExtractor::load(Path::new(&arcface_path), intra_threads)
                .map_err(anyhow::Error::from)
        },
        health.clone(),
    );

    let port = config.port;
    let state = AppState::new(
        config,
        engine,
        health,
        Arc::new(MemoryGallery::new()),
        ARCFACE_MODEL_VERSION,
    );
    let app = verifaced::api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("verifaced shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
