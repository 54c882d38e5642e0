use std::sync::Arc;
use std::time::Instant;

use crate::attendance::AttendanceLog;
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::engine::EngineHandle;
use crate::gallery::GalleryStore;
use crate::health::HealthState;
use crate::pipeline::Pipeline;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
    pub gallery: Arc<dyn GalleryStore>,
    pub attendance: Arc<AttendanceLog>,
    pub health: HealthState,
    pub model_version: String,
    pub started_at: Instant,
}

impl AppState {
    /// Assemble the service state around an already-spawned engine.
    pub fn new(
        config: Config,
        engine: EngineHandle,
        health: HealthState,
        gallery: Arc<dyn GalleryStore>,
        model_version: impl Into<String>,
    ) -> Self {
        let config = Arc::new(config);
        let cache = EmbeddingCache::new(config.cache_capacity, config.cache_ttl());
        let pipeline = Pipeline::new(
            engine,
            cache,
            health.clone(),
            config.decode_limits(),
            config.request_timeout(),
        );
        let attendance = Arc::new(AttendanceLog::new(chrono::Duration::minutes(
            config.cooldown_minutes as i64,
        )));
        Self {
            config,
            pipeline,
            gallery,
            attendance,
            health,
            model_version: model_version.into(),
            started_at: Instant::now(),
        }
    }
}
