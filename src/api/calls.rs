//! Call action routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use super::{AppState, error_response};
use crate::actions::{ActionError, CallSummary};

/// Request bodies keep every field optional; the action layer decides
/// what is required and answers with a field-specific 400.
#[derive(Debug, Deserialize)]
pub(super) struct MakeCallRequest {
    to: Option<String>,
    sdp_offer: Option<String>,
    tracking_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct MakeCallResponse {
    success: bool,
    call_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnswerCallRequest {
    call_id: Option<String>,
    sdp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TerminateCallRequest {
    call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct AckResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct CallListResponse {
    active_calls: Vec<CallSummary>,
    total_count: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct CallSdpResponse {
    sdp: String,
}

pub(super) async fn make_call(
    State(state): State<AppState>,
    Json(request): Json<MakeCallRequest>,
) -> Result<Json<MakeCallResponse>, ActionError> {
    let call_id = state
        .relay
        .make_call(
            request.to.as_deref(),
            request.sdp_offer.as_deref(),
            request.tracking_data,
        )
        .await?;
    Ok(Json(MakeCallResponse {
        success: true,
        call_id,
    }))
}

pub(super) async fn preaccept_call(
    State(state): State<AppState>,
    Json(request): Json<AnswerCallRequest>,
) -> Result<Json<AckResponse>, ActionError> {
    state
        .relay
        .preaccept_call(request.call_id.as_deref(), request.sdp.as_deref())
        .await?;
    Ok(Json(AckResponse { success: true }))
}

pub(super) async fn accept_call(
    State(state): State<AppState>,
    Json(request): Json<AnswerCallRequest>,
) -> Result<Json<AckResponse>, ActionError> {
    state
        .relay
        .accept_call(request.call_id.as_deref(), request.sdp.as_deref())
        .await?;
    Ok(Json(AckResponse { success: true }))
}

pub(super) async fn terminate_call(
    State(state): State<AppState>,
    Json(request): Json<TerminateCallRequest>,
) -> Result<Json<AckResponse>, ActionError> {
    state
        .relay
        .terminate_call(request.call_id.as_deref())
        .await?;
    Ok(Json(AckResponse { success: true }))
}

pub(super) async fn list_calls(State(state): State<AppState>) -> Json<CallListResponse> {
    let active_calls = state.relay.active_calls();
    let total_count = active_calls.len();
    Json(CallListResponse {
        active_calls,
        total_count,
    })
}

pub(super) async fn call_sdp(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    match state.relay.call_sdp(&call_id) {
        Some(sdp) => Json(CallSdpResponse { sdp }).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("no SDP stored for call {call_id}"),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fields_are_optional() {
        let request: MakeCallRequest = serde_json::from_str("{}").unwrap();
        assert!(request.to.is_none());
        assert!(request.sdp_offer.is_none());
        assert!(request.tracking_data.is_none());

        let request: MakeCallRequest = serde_json::from_str(
            r#"{"to": "15551234567", "sdp_offer": "v=0", "tracking_data": "crm-7712"}"#,
        )
        .unwrap();
        assert_eq!(request.to.as_deref(), Some("15551234567"));

        let request: AnswerCallRequest =
            serde_json::from_str(r#"{"call_id": "wacid.X", "sdp": "v=0"}"#).unwrap();
        assert_eq!(request.call_id.as_deref(), Some("wacid.X"));
    }

    #[test]
    fn test_response_shapes() {
        let response = MakeCallResponse {
            success: true,
            call_id: "wacid.NEWCALL".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"success": true, "call_id": "wacid.NEWCALL"})
        );

        let response = CallListResponse {
            active_calls: Vec::new(),
            total_count: 0,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"active_calls": [], "total_count": 0})
        );
    }
}
