//! Webhook payload parsing and event classification.

use serde::Deserialize;

use crate::session::{CallDirection, CallState};

/// `object` value the platform sets on call webhook deliveries.
pub const WEBHOOK_OBJECT: &str = "whatsapp_business_account";

/// Wire value marking a call the business placed itself.
const BUSINESS_INITIATED: &str = "BUSINESS_INITIATED";

/// Top-level webhook delivery. Fields the relay does not act on are
/// defaulted rather than required so a sparse or future-shaped payload
/// still parses.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub calls: Vec<CallNotification>,
    #[serde(default)]
    pub statuses: Vec<StatusNotification>,
}

/// One signaling event inside a `calls` change.
#[derive(Debug, Clone, Deserialize)]
pub struct CallNotification {
    pub id: String,
    #[serde(default)]
    pub event: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
    pub session: Option<SessionPayload>,
    pub timestamp: Option<String>,
}

impl CallNotification {
    pub fn classify(&self) -> Option<CallEvent> {
        CallEvent::from_name(&self.event)
    }

    /// Resolves the wire direction tag. Anything other than an explicit
    /// business-initiated marker is treated as a user-initiated call.
    pub fn direction(&self) -> CallDirection {
        match self.direction.as_deref() {
            Some(tag) if tag.eq_ignore_ascii_case(BUSINESS_INITIATED) => CallDirection::Outbound,
            _ => CallDirection::Inbound,
        }
    }

    pub fn sdp(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.sdp.as_deref())
    }
}

/// SDP envelope carried on connect events. The blob itself is opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPayload {
    pub sdp_type: Option<String>,
    pub sdp: Option<String>,
}

/// One progress notification inside a `statuses` change.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusNotification {
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub timestamp: Option<String>,
}

impl StatusNotification {
    pub fn classify(&self) -> Option<CallStatusKind> {
        CallStatusKind::from_name(&self.status)
    }
}

/// Closed set of call event names the dispatcher understands. Unknown
/// names never reach the state machine; callers log and drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Connect,
    Terminate,
    Status(CallStatusKind),
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Connect => "connect",
            CallEvent::Terminate => "terminate",
            CallEvent::Status(kind) => kind.name(),
        }
    }

    /// Case-insensitive lookup. Returns `None` for event names this
    /// relay does not know.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "connect" => Some(CallEvent::Connect),
            "terminate" => Some(CallEvent::Terminate),
            other => CallStatusKind::from_name(other).map(CallEvent::Status),
        }
    }
}

impl std::fmt::Display for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Progress statuses the platform reports while a call is being set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatusKind {
    Ringing,
    Accepted,
    Rejected,
}

impl CallStatusKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallStatusKind::Ringing => "ringing",
            CallStatusKind::Accepted => "accepted",
            CallStatusKind::Rejected => "rejected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ringing" => Some(CallStatusKind::Ringing),
            "accepted" => Some(CallStatusKind::Accepted),
            "rejected" => Some(CallStatusKind::Rejected),
            _ => None,
        }
    }

    /// The session state a status notification asserts.
    pub fn as_state(&self) -> CallState {
        match self {
            CallStatusKind::Ringing => CallState::Ringing,
            CallStatusKind::Accepted => CallState::Accepted,
            CallStatusKind::Rejected => CallState::Rejected,
        }
    }
}

/// Query parameters of the platform's webhook verification handshake.
/// Every field is optional so a bare GET still parses and fails the
/// token match instead of failing extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl VerifyParams {
    pub fn matches(&self, expected_token: &str) -> bool {
        self.mode.as_deref() == Some("subscribe")
            && self.verify_token.as_deref() == Some(expected_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INBOUND_CONNECT: &str = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "calls",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550783881",
                        "phone_number_id": "106540352242922"
                    },
                    "calls": [{
                        "id": "wacid.ABGGFjFVU2AfAgo6sHAAHA",
                        "from": "15551234567",
                        "to": "15550783881",
                        "event": "connect",
                        "timestamp": "1671644824",
                        "direction": "USER_INITIATED",
                        "session": {
                            "sdp_type": "offer",
                            "sdp": "v=0\r\no=- 4962303333179871722 2 IN IP4 127.0.0.1"
                        }
                    }]
                }
            }]
        }]
    }"#;

    #[test]
    fn test_parse_inbound_connect_payload() {
        let payload: WebhookPayload = serde_json::from_str(INBOUND_CONNECT).unwrap();
        assert_eq!(payload.object, WEBHOOK_OBJECT);
        assert_eq!(payload.entry.len(), 1);

        let change = &payload.entry[0].changes[0];
        assert_eq!(change.field, "calls");
        assert_eq!(change.value.calls.len(), 1);
        assert!(change.value.statuses.is_empty());

        let call = &change.value.calls[0];
        assert_eq!(call.id, "wacid.ABGGFjFVU2AfAgo6sHAAHA");
        assert_eq!(call.classify(), Some(CallEvent::Connect));
        assert_eq!(call.direction(), CallDirection::Inbound);
        assert_eq!(call.from.as_deref(), Some("15551234567"));
        assert!(call.sdp().unwrap().starts_with("v=0"));
    }

    #[test]
    fn test_parse_status_payload() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "102290129340398",
                "changes": [{
                    "field": "calls",
                    "value": {
                        "statuses": [
                            {"id": "wacid.ABGGFjFVU2AfAgo6sHAAHA", "status": "RINGING", "timestamp": "1671644830"},
                            {"id": "wacid.ABGGFjFVU2AfAgo6sHAAHA", "status": "ACCEPTED", "timestamp": "1671644835"}
                        ]
                    }
                }]
            }]
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        let statuses = &payload.entry[0].changes[0].value.statuses;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].classify(), Some(CallStatusKind::Ringing));
        assert_eq!(
            statuses[1].classify().unwrap().as_state(),
            CallState::Accepted
        );
    }

    #[test]
    fn test_sparse_payload_still_parses() {
        let payload: WebhookPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.object.is_empty());
        assert!(payload.entry.is_empty());

        let payload: WebhookPayload =
            serde_json::from_str(r#"{"entry": [{"changes": [{"value": {}}]}]}"#).unwrap();
        let change = &payload.entry[0].changes[0];
        assert!(change.field.is_empty());
        assert!(change.value.calls.is_empty());
    }

    #[test]
    fn test_call_missing_id_fails_parse() {
        let raw = r#"{"entry": [{"changes": [{"field": "calls", "value": {"calls": [{"event": "connect"}]}}]}]}"#;
        assert!(serde_json::from_str::<WebhookPayload>(raw).is_err());
    }

    #[test]
    fn test_event_name_lookup() {
        assert_eq!(CallEvent::from_name("connect"), Some(CallEvent::Connect));
        assert_eq!(CallEvent::from_name("CONNECT"), Some(CallEvent::Connect));
        assert_eq!(
            CallEvent::from_name("Terminate"),
            Some(CallEvent::Terminate)
        );
        assert_eq!(
            CallEvent::from_name("rejected"),
            Some(CallEvent::Status(CallStatusKind::Rejected))
        );
        assert_eq!(CallEvent::from_name("video_upgrade"), None);
        assert_eq!(CallEvent::Terminate.to_string(), "terminate");
    }

    #[test]
    fn test_direction_defaults_to_inbound() {
        let raw = r#"{"id": "wacid.X", "event": "connect"}"#;
        let call: CallNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(call.direction(), CallDirection::Inbound);

        let raw = r#"{"id": "wacid.X", "event": "connect", "direction": "BUSINESS_INITIATED"}"#;
        let call: CallNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(call.direction(), CallDirection::Outbound);
    }

    #[test]
    fn test_verify_params_match() {
        let raw = r#"{
            "hub.mode": "subscribe",
            "hub.verify_token": "secret",
            "hub.challenge": "1158201444"
        }"#;
        let params: VerifyParams = serde_json::from_str(raw).unwrap();
        assert!(params.matches("secret"));
        assert!(!params.matches("other"));
        assert_eq!(params.challenge.as_deref(), Some("1158201444"));
    }

    #[test]
    fn test_verify_params_missing_fields_never_match() {
        let params: VerifyParams = serde_json::from_str("{}").unwrap();
        assert!(!params.matches("secret"));

        let raw = r#"{"hub.mode": "unsubscribe", "hub.verify_token": "secret"}"#;
        let params: VerifyParams = serde_json::from_str(raw).unwrap();
        assert!(!params.matches("secret"));
    }
}
