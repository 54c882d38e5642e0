use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Deserialize;
use serde_json::{json, Value};
use veriface_core::{compare, identify, Embedding, KnownFace, MatchPolicy, MatchResult};

use crate::attendance::RecordOutcome;
use crate::health::HealthStatus;
use crate::pipeline::with_budget;
use crate::state::AppState;

use super::error::{ApiError, ApiResult};

/// Accepts both raw base64 and `data:image/...;base64,` URLs, which is what
/// browser canvas captures produce.
fn decode_base64_field(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    let payload = value
        .rsplit_once("base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(value);
    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|err| ApiError::invalid_image(format!("{field} is not valid base64: {err}")))
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

fn policy_for(state: &AppState, threshold: Option<f32>) -> Result<MatchPolicy, ApiError> {
    let mut policy = state.config.match_policy();
    if let Some(threshold) = threshold {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ApiError::bad_request("threshold must be a positive number"));
        }
        policy.threshold = threshold;
    }
    Ok(policy)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.status();
    let http_status = match status {
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (
        http_status,
        Json(json!({
            "status": status,
            "model_version": state.model_version,
            "gallery_size": state.gallery.len(),
            "uptime_secs": state.started_at.elapsed().as_secs(),
        })),
    )
}

#[derive(Deserialize)]
pub struct DetectRequest {
    image: String,
}

pub async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> ApiResult<Json<Value>> {
    let bytes = decode_base64_field("image", &req.image)?;
    let regions = with_budget(state.pipeline.budget(), state.pipeline.detect(bytes)).await?;
    Ok(Json(json!({
        "faces_detected": regions.len(),
        "faces": regions,
    })))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    image: String,
    #[serde(default)]
    reference_image: Option<String>,
    #[serde(default)]
    reference_id: Option<String>,
    #[serde(default)]
    threshold: Option<f32>,
}

enum Reference {
    Image(Vec<u8>),
    Known(KnownFace),
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<MatchResult>> {
    let policy = policy_for(&state, req.threshold)?;
    let image = decode_base64_field("image", &req.image)?;
    let reference = match (req.reference_image, req.reference_id) {
        (Some(reference), None) => {
            Reference::Image(decode_base64_field("reference_image", &reference)?)
        }
        (None, Some(id)) => {
            let known = state
                .gallery
                .fetch(&id)
                .ok_or_else(|| ApiError::not_found(format!("no identity named {id}")))?;
            Reference::Known(known)
        }
        _ => {
            return Err(ApiError::bad_request(
                "provide exactly one of reference_image or reference_id",
            ));
        }
    };

    let pipeline = state.pipeline.clone();
    let (probe, reference_embedding, matched) = with_budget(pipeline.budget(), async {
        let probe = pipeline.probe(image).await?;
        let (reference_embedding, matched): (Embedding, Option<(String, String)>) = match reference
        {
            Reference::Image(bytes) => (pipeline.probe(bytes).await?.embedding, None),
            Reference::Known(known) => (known.embedding, Some((known.id, known.name))),
        };
        Ok((probe, reference_embedding, matched))
    })
    .await?;

    let mut result = compare(&probe.embedding, &reference_embedding, &policy)?;
    if let Some((id, name)) = matched {
        result.matched_id = Some(id);
        result.matched_name = Some(name);
    }
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct RecognizeRequest {
    image: String,
    #[serde(default)]
    threshold: Option<f32>,
}

pub async fn recognize(
    State(state): State<AppState>,
    Json(req): Json<RecognizeRequest>,
) -> ApiResult<Json<Value>> {
    let policy = policy_for(&state, req.threshold)?;
    let bytes = decode_base64_field("image", &req.image)?;
    let probe = with_budget(state.pipeline.budget(), state.pipeline.probe(bytes)).await?;

    let gallery = state.gallery.snapshot();
    match identify(&probe.embedding, &gallery, &policy)? {
        Some(result) if result.verified => Ok(Json(json!({
            "name": result.matched_name,
            "confidence": round3(1.0 - result.distance),
            "distance": round3(result.distance),
            "threshold": policy.threshold,
        }))),
        Some(result) => Ok(Json(json!({
            "name": null,
            "distance": round3(result.distance),
            "threshold": policy.threshold,
        }))),
        None => Ok(Json(json!({
            "name": null,
            "threshold": policy.threshold,
        }))),
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: String,
    image: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let bytes = decode_base64_field("image", &req.image)?;
    let probe = with_budget(state.pipeline.budget(), state.pipeline.probe_single(bytes)).await?;

    let record = state.gallery.insert(name, probe.embedding);
    tracing::info!(name = %record.name, id = %record.id, "identity enrolled");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": record.id,
            "name": record.name,
            "enrolled_at": record.enrolled_at,
            "gallery_size": state.gallery.len(),
        })),
    ))
}

pub async fn list_identities(State(state): State<AppState>) -> Json<Value> {
    let identities: Vec<Value> = state
        .gallery
        .snapshot()
        .into_iter()
        .map(|face| {
            json!({
                "id": face.id,
                "name": face.name,
                "enrolled_at": face.enrolled_at,
            })
        })
        .collect();
    Json(json!({
        "count": identities.len(),
        "identities": identities,
    }))
}

pub async fn remove_identity(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.gallery.remove(&name) {
        return Err(ApiError::not_found(format!("no identity named {name}")));
    }
    tracing::info!(name = %name, "identity removed");
    Ok(Json(json!({
        "removed": name,
        "remaining": state.gallery.len(),
    })))
}

#[derive(Deserialize)]
pub struct AttendanceRequest {
    name: String,
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    Json(req): Json<AttendanceRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if state.gallery.fetch(&req.name).is_none() {
        return Err(ApiError::not_found(format!("no identity named {}", req.name)));
    }
    match state.attendance.record(&req.name) {
        RecordOutcome::Recorded(record) => {
            tracing::info!(name = %record.name, "attendance recorded");
            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "recorded": true,
                    "name": record.name,
                    "timestamp": record.timestamp,
                })),
            ))
        }
        RecordOutcome::CoolingDown { retry_after_secs } => {
            Err(ApiError::cooldown(retry_after_secs))
        }
    }
}

#[derive(Deserialize)]
pub struct AttendanceQuery {
    limit: Option<usize>,
    name: Option<String>,
}

pub async fn attendance_log(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Json<Value> {
    let records = match query.name.as_deref() {
        Some(name) => {
            let mut records: Vec<_> = state
                .attendance
                .recent(None)
                .into_iter()
                .filter(|record| record.name == name)
                .collect();
            if let Some(limit) = query.limit {
                records.truncate(limit);
            }
            records
        }
        None => state.attendance.recent(query.limit),
    };
    Json(json!({
        "count": records.len(),
        "records": records,
    }))
}
