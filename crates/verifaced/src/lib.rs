//! verifaced — HTTP face verification and attendance service.
//!
//! Decodes submitted images, locates faces with SCRFD, extracts ArcFace
//! embeddings, and matches them against an enrolled gallery. The binary in
//! `main.rs` wires the ONNX-backed engine; the library surface exists so
//! integration tests can run the full HTTP stack against stub models.

pub mod api;
pub mod attendance;
pub mod cache;
pub mod config;
pub mod engine;
pub mod gallery;
pub mod health;
pub mod pipeline;
pub mod state;
