//! Webhook verification and delivery routes.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{info, warn};
use wacall_core::webhook::{VerifyParams, WebhookPayload};

use super::AppState;

/// Platform verification handshake: echo the challenge when the mode
/// and token match, reject with 403 otherwise.
pub(super) async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    if params.matches(&state.config.verify_token) {
        info!("Webhook verified");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        warn!("Webhook verification failed (mode {:?})", params.mode);
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Webhook delivery. The 200 goes out immediately; the payload is
/// handed to the dispatcher on its own task so nothing downstream can
/// delay or fail the acknowledgment.
pub(super) async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            let relay = state.relay.clone();
            tokio::spawn(async move {
                relay.process_webhook(payload).await;
            });
        }
        Err(e) => warn!("Undecodable webhook payload ({} bytes): {e}", body.len()),
    }
    StatusCode::OK
}
