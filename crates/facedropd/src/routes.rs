//! HTTP surface: `POST /upload` and `GET /status`.

use crate::engine::EngineHandle;
use crate::error::{ApiError, ProcessingError};
use crate::state::AppState;
use crate::storage::UploadedFile;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use facedrop_core::bundle::MODEL_FILES;
use facedrop_core::{load_bitmap, Detection};
use serde_json::{json, Value};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/upload", post(upload))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /upload - store the `file` field, decode it, and return one
/// detection per face as a JSON array.
///
/// # Errors
/// - 503 Service Unavailable: models not loaded yet (nothing is stored)
/// - 400 Bad Request: no `file` field with a filename
/// - 413 Payload Too Large: body over `FACEDROP_MAX_UPLOAD_BYTES`
/// - 500 Internal Server Error: storage, decode, analysis failure or timeout
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<Detection>>, ApiError> {
    let engine = state.engine().cloned().ok_or(ApiError::NotReady)?;

    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "request body is not multipart");
        ApiError::MissingFile
    })?;

    let file = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| {
                if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::PayloadTooLarge
                } else {
                    tracing::debug!(error = %e, "malformed multipart body");
                    ApiError::MissingFile
                }
            })?
            .ok_or(ApiError::MissingFile)?;

        let original_name = match (field.name(), field.file_name()) {
            (Some(UPLOAD_FIELD), Some(name)) if !name.is_empty() => name.to_string(),
            (name, _) => {
                tracing::debug!(field = ?name, "skipping multipart field");
                continue;
            }
        };

        break state.sink.store(&original_name, field).await?;
    };

    let result = analyze_upload(&engine, &file, state.config.detect_timeout).await;

    if !state.config.retain_uploads {
        state.sink.discard(&file).await;
    }

    let detections = result?;
    tracing::info!(
        original = ?file.original_name,
        stored = %file.stored_name,
        size = file.size,
        faces = detections.len(),
        "upload analyzed"
    );

    Ok(Json(detections))
}

async fn analyze_upload(
    engine: &EngineHandle,
    file: &UploadedFile,
    timeout: Duration,
) -> Result<Vec<Detection>, ProcessingError> {
    let path = file.path.clone();
    let bitmap = tokio::task::spawn_blocking(move || load_bitmap(&path)).await??;

    let detections = tokio::time::timeout(timeout, engine.analyze(bitmap))
        .await
        .map_err(|_| ProcessingError::TimedOut(timeout))??;

    Ok(detections)
}

/// GET /status - daemon version and model readiness.
async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": state.is_ready(),
        "models": MODEL_FILES,
    }))
}
