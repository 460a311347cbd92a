//! Graph API signaling client.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Platform error code meaning the counter-party has not granted the
/// business permission to call them. Surfaced to API callers so they
/// can branch without string-matching.
pub const PERMISSION_ERROR_CODE: i64 = 138006;

/// Platform error code for an expired or invalid access token.
const AUTH_ERROR_CODE: i64 = 190;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalingError {
    #[error("platform rejected credentials: {0}")]
    Auth(String),
    #[error("calling permission missing (code {code})")]
    PermissionDenied { code: i64 },
    #[error("platform returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("network error talking to platform: {0}")]
    Network(String),
}

/// Outbound call-control actions against the calling platform. One
/// request per operation, no automatic retries; callers decide what a
/// failure means for them.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Places an outbound call. Returns the platform-assigned call id.
    async fn connect(
        &self,
        to: &str,
        sdp_offer: &str,
        tracking_data: Option<&str>,
    ) -> Result<String, SignalingError>;

    /// Signals media path readiness ahead of the final accept.
    async fn pre_accept(&self, call_id: &str, sdp_answer: &str) -> Result<(), SignalingError>;

    async fn accept(&self, call_id: &str, sdp_answer: &str) -> Result<(), SignalingError>;

    async fn terminate(&self, call_id: &str) -> Result<(), SignalingError>;
}

/// `SignalingClient` backed by the platform's Graph API calls endpoint.
pub struct GraphClient {
    http: reqwest::Client,
    calls_url: String,
    access_token: String,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_version: &str,
        phone_number_id: &str,
        access_token: String,
    ) -> Self {
        Self {
            http,
            calls_url: endpoint_url(base_url, api_version, phone_number_id),
            access_token,
        }
    }

    async fn post_action(&self, body: Value) -> Result<String, SignalingError> {
        debug!(
            "POST {} action={}",
            self.calls_url,
            body["action"].as_str().unwrap_or("?")
        );
        let response = self
            .http
            .post(&self.calls_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SignalingError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SignalingError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl SignalingClient for GraphClient {
    async fn connect(
        &self,
        to: &str,
        sdp_offer: &str,
        tracking_data: Option<&str>,
    ) -> Result<String, SignalingError> {
        let text = self
            .post_action(connect_body(to, sdp_offer, tracking_data))
            .await?;
        parse_connect_response(&text)
    }

    async fn pre_accept(&self, call_id: &str, sdp_answer: &str) -> Result<(), SignalingError> {
        self.post_action(answer_body("pre_accept", call_id, sdp_answer))
            .await
            .map(|_| ())
    }

    async fn accept(&self, call_id: &str, sdp_answer: &str) -> Result<(), SignalingError> {
        self.post_action(answer_body("accept", call_id, sdp_answer))
            .await
            .map(|_| ())
    }

    async fn terminate(&self, call_id: &str) -> Result<(), SignalingError> {
        self.post_action(terminate_body(call_id)).await.map(|_| ())
    }
}

fn endpoint_url(base_url: &str, api_version: &str, phone_number_id: &str) -> String {
    format!(
        "{}/{}/{}/calls",
        base_url.trim_end_matches('/'),
        api_version,
        phone_number_id
    )
}

fn connect_body(to: &str, sdp_offer: &str, tracking_data: Option<&str>) -> Value {
    let mut body = json!({
        "messaging_product": "whatsapp",
        "to": to,
        "action": "connect",
        "session": {"sdp_type": "offer", "sdp": sdp_offer},
    });
    if let Some(data) = tracking_data {
        body["biz_opaque_callback_data"] = Value::String(data.to_string());
    }
    body
}

fn answer_body(action: &str, call_id: &str, sdp_answer: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "call_id": call_id,
        "action": action,
        "session": {"sdp_type": "answer", "sdp": sdp_answer},
    })
}

fn terminate_body(call_id: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "call_id": call_id,
        "action": "terminate",
    })
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    calls: Vec<ConnectedCall>,
}

#[derive(Debug, Deserialize)]
struct ConnectedCall {
    id: String,
}

/// Pulls the assigned call id out of a successful connect response.
fn parse_connect_response(body: &str) -> Result<String, SignalingError> {
    serde_json::from_str::<ConnectResponse>(body)
        .ok()
        .and_then(|response| response.calls.into_iter().next())
        .map(|call| call.id)
        .ok_or_else(|| SignalingError::Remote {
            status: 200,
            body: body.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    code: Option<i64>,
}

/// Maps a failed platform response onto the error taxonomy. The
/// permission code is matched exactly; everything else falls through to
/// a generic remote error carrying the raw body for diagnostics.
fn classify_failure(status: u16, body: &str) -> SignalingError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_default();
    let message = if detail.message.is_empty() {
        body.to_string()
    } else {
        detail.message
    };

    match detail.code {
        Some(PERMISSION_ERROR_CODE) => SignalingError::PermissionDenied {
            code: PERMISSION_ERROR_CODE,
        },
        Some(AUTH_ERROR_CODE) => SignalingError::Auth(message),
        _ if status == 401 => SignalingError::Auth(message),
        _ => SignalingError::Remote {
            status,
            body: body.to_string(),
        },
    }
}
