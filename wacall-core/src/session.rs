//! Call session state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a call relative to the business number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallDirection {
    /// A WhatsApp user dialed the business number.
    Inbound,
    /// The business dialed a WhatsApp user.
    Outbound,
}

/// Lifecycle state of a call session.
///
/// States are ordered: a session only ever moves to a state of equal or
/// higher rank, so late or duplicated webhook deliveries can never undo
/// progress already made. Re-asserting the current state is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallState {
    /// Outbound call placed, no signaling heard back yet.
    Initiated,
    /// Inbound offer received, awaiting an answer decision.
    Incoming,
    /// The remote device is ringing.
    Ringing,
    /// Media path readiness signaled ahead of the final accept.
    Preaccepted,
    /// The call was accepted by either side.
    Accepted,
    /// The remote party declined the call.
    Rejected,
    /// SDP answer exchanged, media path is being established.
    Connecting,
    /// The call ended. Sessions in this state are dropped from the store.
    Terminated,
}

impl CallState {
    /// Wire representation, as the platform spells it in status events.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Initiated => "INITIATED",
            CallState::Incoming => "INCOMING",
            CallState::Ringing => "RINGING",
            CallState::Preaccepted => "PREACCEPTED",
            CallState::Accepted => "ACCEPTED",
            CallState::Rejected => "REJECTED",
            CallState::Connecting => "CONNECTING",
            CallState::Terminated => "TERMINATED",
        }
    }

    /// Position along the lifecycle. Accepted/Rejected share a rank: a
    /// call resolves one way or the other, never both. Connecting ranks
    /// above Accepted because the connect event carrying the remote SDP
    /// answer may arrive after the ACCEPTED status notification.
    const fn rank(&self) -> u8 {
        match self {
            CallState::Initiated | CallState::Incoming => 0,
            CallState::Ringing => 1,
            CallState::Preaccepted => 2,
            CallState::Accepted | CallState::Rejected => 3,
            CallState::Connecting => 4,
            CallState::Terminated => 5,
        }
    }

    /// Whether a transition from `self` to `next` moves the lifecycle
    /// forward. Re-asserting the current state is allowed.
    pub fn allows(&self, next: CallState) -> bool {
        *self == next || next.rank() > self.rank()
    }

    /// True once no further state change is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Terminated)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A partial update merged into a session. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub state: Option<CallState>,
    pub sdp_offer: Option<String>,
    pub sdp_answer: Option<String>,
    pub peer: Option<String>,
    pub tracking_data: Option<String>,
}

/// One call's lifecycle as seen by the relay.
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub call_id: String,
    pub direction: CallDirection,
    pub state: CallState,
    /// Opaque SDP blob from the offering side. Never parsed.
    pub sdp_offer: Option<String>,
    /// Opaque SDP blob from the answering side. Never parsed.
    pub sdp_answer: Option<String>,
    /// Counter-party phone number, when known.
    pub peer: Option<String>,
    /// Caller-supplied correlation token, passed through unmodified.
    pub tracking_data: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, direction: CallDirection) -> Self {
        let state = match direction {
            CallDirection::Inbound => CallState::Incoming,
            CallDirection::Outbound => CallState::Initiated,
        };
        Self {
            call_id: call_id.into(),
            direction,
            state,
            sdp_offer: None,
            sdp_answer: None,
            peer: None,
            tracking_data: None,
            last_updated: Utc::now(),
        }
    }

    /// Merges `patch` into the session, enforcing forward-only state
    /// movement. On error the session is left untouched.
    pub fn apply(&mut self, patch: SessionPatch) -> Result<(), SessionError> {
        if let Some(next) = patch.state {
            if !self.state.allows(next) {
                return Err(SessionError::InvalidTransition {
                    current: self.state,
                    attempted: next,
                });
            }
        }
        // An answer is only meaningful once an offer exists. Outbound
        // sessions are exempt: the offer left this process via make-call
        // and may not be in the store after a restart.
        if patch.sdp_answer.is_some()
            && self.direction == CallDirection::Inbound
            && self.sdp_offer.is_none()
            && patch.sdp_offer.is_none()
        {
            return Err(SessionError::AnswerBeforeOffer);
        }
        if let Some(next) = patch.state {
            self.state = next;
        }
        if let Some(sdp) = patch.sdp_offer {
            self.sdp_offer = Some(sdp);
        }
        if let Some(sdp) = patch.sdp_answer {
            self.sdp_answer = Some(sdp);
        }
        if let Some(peer) = patch.peer {
            self.peer = Some(peer);
        }
        if let Some(data) = patch.tracking_data {
            self.tracking_data = Some(data);
        }
        self.last_updated = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid call state transition from {current} to {attempted}")]
    InvalidTransition {
        current: CallState,
        attempted: CallState,
    },
    #[error("cannot record an SDP answer before an offer exists")]
    AnswerBeforeOffer,
}
