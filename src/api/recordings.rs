//! Call recording upload route.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use log::{error, info};
use serde::Serialize;

use super::{AppState, error_response};

#[derive(Debug, Serialize)]
pub(super) struct UploadResponse {
    success: bool,
    stored_as: String,
    bytes: usize,
}

/// Accepts a finished call's audio blob and writes it under the
/// configured recordings directory, as received.
pub(super) async fn upload(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty recording body", None);
    }

    let file_name = recording_file_name(&call_id);
    let path = state.config.recordings_dir.join(&file_name);

    if let Err(e) = tokio::fs::create_dir_all(&state.config.recordings_dir).await {
        error!("Cannot create recordings directory: {e}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "recording storage unavailable",
            None,
        );
    }
    if let Err(e) = tokio::fs::write(&path, &body).await {
        error!("Cannot write recording {}: {e}", path.display());
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "recording storage failed",
            None,
        );
    }

    info!("Stored recording {} ({} bytes)", file_name, body.len());
    Json(UploadResponse {
        success: true,
        stored_as: file_name,
        bytes: body.len(),
    })
    .into_response()
}

/// Call ids come from an external system, so anything outside a safe
/// character set is flattened before the id becomes part of a path.
fn recording_file_name(call_id: &str) -> String {
    let sanitized: String = call_id
        .chars()
        .take(128)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{sanitized}-{timestamp}.bin")
}
