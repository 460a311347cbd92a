//! HTTP router and shared handler state.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::actions::ActionError;
use crate::config::RelayConfig;
use crate::graph::SignalingError;
use crate::relay::Relay;

mod calls;
mod oauth;
mod recordings;
mod webhook;
mod ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub http: reqwest::Client,
    pub config: Arc<RelayConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .route("/make-call", post(calls::make_call))
        .route("/preaccept-call", post(calls::preaccept_call))
        .route("/accept-call", post(calls::accept_call))
        .route("/terminate-call", post(calls::terminate_call))
        .route("/calls", get(calls::list_calls))
        .route("/call-sdp/{call_id}", get(calls::call_sdp))
        .route("/ws", get(ws::subscribe))
        .route("/oauth/exchange", post(oauth::exchange))
        .route("/call-recording/{call_id}", post(recordings::upload))
        .route("/health-check", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i64>,
}

/// Uniform JSON error envelope for every failed request.
pub(crate) fn error_response(status: StatusCode, message: &str, code: Option<i64>) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: message.to_string(),
            code,
        }),
    )
        .into_response()
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        match &self {
            ActionError::MissingField(_)
            | ActionError::UnknownCall(_)
            | ActionError::NoOffer(_)
            | ActionError::Session(_) => {
                debug!("Rejecting call action: {self}");
                error_response(StatusCode::BAD_REQUEST, &self.to_string(), None)
            }
            ActionError::Signaling(SignalingError::PermissionDenied { code }) => {
                warn!("Call action not permitted: {self}");
                error_response(StatusCode::FORBIDDEN, &self.to_string(), Some(*code))
            }
            ActionError::Signaling(_) => {
                error!("Call action failed: {self}");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &self.to_string(), None)
            }
        }
    }
}
