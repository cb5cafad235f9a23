//! Request handlers

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::multipart::read_edit_fields;
use crate::engine::EditResult;
use crate::error::{AppError, Result};
use crate::gate::GateStats;
use crate::validation;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ImageData {
    pub b64_json: String,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub processing_time_seconds: f64,
    pub input_images: usize,
    pub generated_images: usize,
}

/// Body of a successful `/v1/images/edits` call
#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
    pub usage: Usage,
}

impl From<EditResult> for EditResponse {
    fn from(result: EditResult) -> Self {
        Self {
            created: result.created,
            usage: Usage {
                processing_time_seconds: result.processing_time.as_secs_f64(),
                input_images: result.input_images,
                generated_images: result.generated_images,
            },
            data: result
                .images
                .into_iter()
                .map(|b64_json| ImageData { b64_json })
                .collect(),
        }
    }
}

/// `GET /health` - liveness; succeeds whenever the process is up
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().timestamp(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /ready` - succeeds once the model has loaded
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<ReadyResponse>> {
    if !state.readiness.is_loaded() {
        return Err(AppError::ModelNotReady);
    }

    Ok(Json(ReadyResponse {
        status: "ready",
        model_loaded: true,
        timestamp: Utc::now().timestamp(),
    }))
}

/// `POST /v1/images/edits`
pub async fn edit_images(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<EditResponse>> {
    if !state.readiness.is_loaded() {
        return Err(AppError::ModelNotReady);
    }

    let multipart = multipart.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let raw = read_edit_fields(multipart).await?;
    debug!(images = raw.images.len(), "Received edit request");

    // Decoding is CPU-bound; keep it off the I/O threads
    let request = tokio::task::spawn_blocking(move || validation::validate(raw))
        .await
        .map_err(|e| AppError::Internal(format!("validation task failed: {}", e)))??;

    let result = state.gate.submit(request).await?;

    info!(
        input_images = result.input_images,
        generated_images = result.generated_images,
        processing_time_ms = result.processing_time.as_millis() as u64,
        "Edit completed"
    );

    Ok(Json(EditResponse::from(result)))
}

/// `GET /v1/gate/stats`
pub async fn gate_stats(State(state): State<Arc<AppState>>) -> Json<GateStats> {
    Json(state.gate.stats())
}
