use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use veriface_core::{DecodeError, MatcherError};

use crate::pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error shape every endpoint returns: an HTTP status plus a JSON body
/// `{"error": <message>, "code": <stable machine code>}`.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_image",
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn cooldown(retry_after_secs: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "cooldown_active",
            message: format!("attendance already recorded, retry in {retry_after_secs}s"),
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match &err {
            PipelineError::Decode(decode) => {
                let code = match decode {
                    DecodeError::TooLarge { .. } | DecodeError::DimensionsExceeded { .. } => {
                        "image_too_large"
                    }
                    _ => "invalid_image",
                };
                (StatusCode::BAD_REQUEST, code)
            }
            PipelineError::NoFaceDetected => (StatusCode::UNPROCESSABLE_ENTITY, "no_face_detected"),
            PipelineError::MultipleFaces { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "multiple_faces")
            }
            PipelineError::ModelUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable")
            }
            PipelineError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
            retry_after_secs: None,
        }
    }
}

impl From<MatcherError> for ApiError {
    fn from(err: MatcherError) -> Self {
        // A mismatch here means the gallery holds embeddings from a different
        // model than the one serving, which is a deployment fault.
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "embedding_dimension_mismatch",
            message: err.to_string(),
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                tracing::warn!(code = self.code, error = %self.message, "request rejected");
            }
            status if status.is_server_error() => {
                tracing::error!(code = self.code, error = %self.message, "request failed");
            }
            _ => {
                tracing::debug!(code = self.code, error = %self.message, "request rejected");
            }
        }

        let body = match self.retry_after_secs {
            Some(secs) => json!({
                "error": self.message,
                "code": self.code,
                "retry_after_secs": secs,
            }),
            None => json!({ "error": self.message, "code": self.code }),
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
