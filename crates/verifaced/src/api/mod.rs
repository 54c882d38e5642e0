mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

/// Build the HTTP API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(vec![
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ]);

    // Base64 framing inflates payloads by 4/3, so the HTTP body cap leaves
    // headroom over the decoded-image limit enforced by the pipeline.
    let body_limit = state.config.max_image_bytes * 2;

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/detect", post(handlers::detect))
        .route("/api/verify", post(handlers::verify))
        .route("/api/recognize", post(handlers::recognize))
        .route("/api/register", post(handlers::register))
        .route("/api/identities", get(handlers::list_identities))
        .route("/api/identities/{name}", delete(handlers::remove_identity))
        .route(
            "/api/attendance",
            post(handlers::mark_attendance).get(handlers::attendance_log),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
