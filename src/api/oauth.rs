//! OAuth authorization-code exchange route.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use log::{error, info};
use serde::{Deserialize, Serialize};

use super::{AppState, error_response};

/// Only the code matters here; the `state` echo from the authorize
/// redirect is the caller's to verify and is ignored if sent along.
#[derive(Debug, Deserialize)]
pub(super) struct ExchangeRequest {
    code: Option<String>,
}

/// Token fields are relayed to the caller as received; anything beyond
/// the access token is passed through opportunistically.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

/// Exchanges an authorization code for tokens against the configured
/// OAuth token endpoint. Shares nothing with the call-session core
/// except process configuration.
pub(super) async fn exchange(
    State(state): State<AppState>,
    Json(request): Json<ExchangeRequest>,
) -> Response {
    let Some(oauth) = state.config.oauth.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "oauth exchange is not configured",
            None,
        );
    };
    let Some(code) = request.code.as_deref().filter(|c| !c.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing required field: code", None);
    };

    let mut form = vec![
        ("client_id", oauth.client_id.as_str()),
        ("client_secret", oauth.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
    ];
    if let Some(redirect_uri) = oauth.redirect_uri.as_deref() {
        form.push(("redirect_uri", redirect_uri));
    }

    let response = match state.http.post(&oauth.token_url).form(&form).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("OAuth exchange request failed: {e}");
            return error_response(StatusCode::BAD_GATEWAY, "token endpoint unreachable", None);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("OAuth exchange rejected ({status}): {body}");
        return error_response(StatusCode::BAD_GATEWAY, "token exchange rejected", None);
    }

    match response.json::<TokenResponse>().await {
        Ok(tokens) => {
            info!("OAuth authorization code exchanged");
            Json(tokens).into_response()
        }
        Err(e) => {
            error!("OAuth token response unreadable: {e}");
            error_response(StatusCode::BAD_GATEWAY, "token response unreadable", None)
        }
    }
}
