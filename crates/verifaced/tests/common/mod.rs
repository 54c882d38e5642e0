//! Shared harness: spawns the full HTTP stack against stub models.
//!
//! Stub behaviour is driven by the fixture image itself. The green channel
//! of pixel (0, 0) sets how many faces the locator reports, while the red
//! and blue channels become the two embedding components, so tests pick
//! match outcomes by picking colours.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use image::{ImageFormat, RgbImage};
use tokio::net::TcpListener;
use veriface_core::{
    Embedding, Extractor, ExtractorError, FaceRegion, Locator, LocatorError, NormalizedImage,
};
use verifaced::config::Config;
use verifaced::engine::spawn_engine;
use verifaced::gallery::MemoryGallery;
use verifaced::health::{HealthState, HealthStatus};
use verifaced::state::AppState;

pub struct StubLocator {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl Locator for StubLocator {
    fn locate(&mut self, image: &NormalizedImage) -> Result<Vec<FaceRegion>, LocatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let faces = image.pixel(0, 0)[1] as usize;
        Ok((0..faces)
            .map(|i| FaceRegion {
                x: 2.0 + 3.0 * i as f32,
                y: 2.0,
                width: 3.0,
                height: 3.0,
                confidence: 0.9 - 0.1 * i as f32,
                landmarks: None,
            })
            .collect())
    }
}

pub struct StubExtractor {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl Extractor for StubExtractor {
    fn extract(
        &mut self,
        image: &NormalizedImage,
        _region: &FaceRegion,
    ) -> Result<Embedding, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let [r, _, b] = image.pixel(0, 0);
        Ok(Embedding {
            values: vec![r as f32, b as f32],
            model_version: "stub".to_string(),
        })
    }

    fn model_version(&self) -> &str {
        "stub"
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub health: HealthState,
    pub locate_calls: Arc<AtomicUsize>,
    pub extract_calls: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn wait_ready(&self) {
        self.wait_for(HealthStatus::Ready).await;
    }

    pub async fn wait_for(&self, status: HealthStatus) {
        for _ in 0..400 {
            if self.health.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("server never reached {status:?}");
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

pub struct TestServerBuilder {
    config: Config,
    load_delay: Duration,
    locate_delay: Duration,
    extract_delay: Duration,
    fail_load: bool,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            load_delay: Duration::ZERO,
            locate_delay: Duration::ZERO,
            extract_delay: Duration::ZERO,
            fail_load: false,
        }
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn locate_delay(mut self, delay: Duration) -> Self {
        self.locate_delay = delay;
        self
    }

    pub fn extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }

    pub fn fail_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub async fn spawn(self) -> TestServer {
        let health = HealthState::new();
        let locate_calls = Arc::new(AtomicUsize::new(0));
        let extract_calls = Arc::new(AtomicUsize::new(0));

        let load_delay = self.load_delay;
        let fail_load = self.fail_load;
        let locate_delay = self.locate_delay;
        let extract_delay = self.extract_delay;
        let locate_counter = locate_calls.clone();
        let extract_counter = extract_calls.clone();

        let engine = spawn_engine(
            move || {
                if !load_delay.is_zero() {
                    std::thread::sleep(load_delay);
                }
                if fail_load {
                    anyhow::bail!("stub model refused to load");
                }
                Ok(StubLocator {
                    delay: locate_delay,
                    calls: locate_counter,
                })
            },
            move || {
                if !load_delay.is_zero() {
                    std::thread::sleep(load_delay);
                }
                Ok(StubExtractor {
                    delay: extract_delay,
                    calls: extract_counter,
                })
            },
            health.clone(),
        );

        let state = AppState::new(
            self.config,
            engine,
            health.clone(),
            Arc::new(MemoryGallery::new()),
            "stub",
        );
        let app = verifaced::api::router(state);

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(&addr).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            health,
            locate_calls,
            extract_calls,
        }
    }
}

/// Ready-to-use server with instant stubs.
pub async fn spawn_server() -> TestServer {
    let server = TestServerBuilder::new().spawn().await;
    server.wait_ready().await;
    server
}

pub fn png_b64(rgb: [u8; 3]) -> String {
    let img = RgbImage::from_pixel(32, 32, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    BASE64_STANDARD.encode(out.into_inner())
}

/// Image whose stub probe yields one face and an embedding along (r, b).
pub fn face_image(r: u8, b: u8) -> String {
    png_b64([r, 1, b])
}

pub fn faceless_image() -> String {
    png_b64([50, 0, 50])
}

pub fn crowd_image() -> String {
    png_b64([50, 3, 50])
}
