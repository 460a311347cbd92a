//! Client-bound event payload definitions.

use serde::Serialize;

use crate::session::CallState;

/// Messages pushed to real-time subscribers. Serialized once per
/// broadcast; the `type` tag is what clients switch on.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Connection confirmation, sent exactly once per subscriber.
    Connected { active_calls: usize },
    IncomingCall {
        call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_offer: Option<String>,
    },
    /// Outbound call connected; `sdp` carries the remote answer.
    CallConnect {
        call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp: Option<String>,
    },
    CallStatus {
        call_id: String,
        status: CallState,
    },
    CallTerminated {
        call_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shapes() {
        let event = ClientEvent::IncomingCall {
            call_id: "wacid.ABGGFjFVU2AfAgo6sHAAHA".to_string(),
            from: Some("15551234567".to_string()),
            sdp_offer: Some("v=0".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "incoming_call",
                "call_id": "wacid.ABGGFjFVU2AfAgo6sHAAHA",
                "from": "15551234567",
                "sdp_offer": "v=0"
            })
        );

        let event = ClientEvent::CallStatus {
            call_id: "wacid.ABGGFjFVU2AfAgo6sHAAHA".to_string(),
            status: CallState::Accepted,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "call_status",
                "call_id": "wacid.ABGGFjFVU2AfAgo6sHAAHA",
                "status": "ACCEPTED"
            })
        );
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let event = ClientEvent::CallConnect {
            call_id: "wacid.X".to_string(),
            sdp: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "call_connect", "call_id": "wacid.X"})
        );

        let event = ClientEvent::Connected { active_calls: 0 };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "connected", "active_calls": 0})
        );
    }

    #[test]
    fn test_terminated_shape() {
        let event = ClientEvent::CallTerminated {
            call_id: "wacid.X".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "call_terminated", "call_id": "wacid.X"})
        );
    }
}
