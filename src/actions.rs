//! Call lifecycle actions exposed to the HTTP surface.

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use thiserror::Error;
use wacall_core::events::ClientEvent;
use wacall_core::session::{CallDirection, CallSession, CallState, SessionError, SessionPatch};

use crate::graph::SignalingError;
use crate::relay::Relay;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown call: {0}")]
    UnknownCall(String),
    #[error("call {0} has no offer to answer")]
    NoOffer(String),
    #[error("signaling action failed: {0}")]
    Signaling(#[from] SignalingError),
    #[error("session update rejected: {0}")]
    Session(#[from] SessionError),
}

fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ActionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ActionError::MissingField(field)),
    }
}

/// Client-facing view of one session. SDP blobs are heavy and fetched on
/// demand through call-sdp, so listings leave them out.
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub direction: CallDirection,
    pub state: CallState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_data: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl From<CallSession> for CallSummary {
    fn from(session: CallSession) -> Self {
        Self {
            call_id: session.call_id,
            direction: session.direction,
            state: session.state,
            peer: session.peer,
            tracking_data: session.tracking_data,
            last_updated: session.last_updated,
        }
    }
}

impl Relay {
    /// Places an outbound call. The session is recorded only once the
    /// platform has assigned a call id, so a rejected attempt leaves no
    /// entry behind.
    pub async fn make_call(
        &self,
        to: Option<&str>,
        sdp_offer: Option<&str>,
        tracking_data: Option<String>,
    ) -> Result<String, ActionError> {
        let to = require(to, "to")?;
        let offer = require(sdp_offer, "sdp_offer")?;

        let call_id = self
            .signaling()
            .connect(to, offer, tracking_data.as_deref())
            .await?;
        info!("Outbound call {call_id} to {to} placed");

        self.store().upsert(
            &call_id,
            CallDirection::Outbound,
            SessionPatch {
                sdp_offer: Some(offer.to_string()),
                peer: Some(to.to_string()),
                tracking_data,
                ..Default::default()
            },
        )?;
        Ok(call_id)
    }

    /// Signals media readiness for an inbound call ahead of the final
    /// accept.
    pub async fn preaccept_call(
        &self,
        call_id: Option<&str>,
        sdp: Option<&str>,
    ) -> Result<(), ActionError> {
        self.answer_call(call_id, sdp, CallState::Preaccepted).await
    }

    pub async fn accept_call(
        &self,
        call_id: Option<&str>,
        sdp: Option<&str>,
    ) -> Result<(), ActionError> {
        self.answer_call(call_id, sdp, CallState::Accepted).await
    }

    async fn answer_call(
        &self,
        call_id: Option<&str>,
        sdp: Option<&str>,
        target: CallState,
    ) -> Result<(), ActionError> {
        let call_id = require(call_id, "call_id")?;
        let sdp = require(sdp, "sdp")?;

        let session = self
            .store()
            .get(call_id)
            .ok_or_else(|| ActionError::UnknownCall(call_id.to_string()))?;
        // Answering an offer we never received would confuse the
        // platform; catch it before the outbound request goes out.
        if session.direction == CallDirection::Inbound && session.sdp_offer.is_none() {
            return Err(ActionError::NoOffer(call_id.to_string()));
        }

        match target {
            CallState::Preaccepted => self.signaling().pre_accept(call_id, sdp).await?,
            CallState::Accepted => self.signaling().accept(call_id, sdp).await?,
            _ => unreachable!("answer_call is only invoked with Preaccepted or Accepted"),
        }

        let updated = self.store().update(
            call_id,
            SessionPatch {
                state: Some(target),
                sdp_answer: Some(sdp.to_string()),
                ..Default::default()
            },
        )?;
        if let Some(session) = updated {
            info!("Call {call_id} answered, now {}", session.state);
            self.fanout().broadcast(&ClientEvent::CallStatus {
                call_id: call_id.to_string(),
                status: session.state,
            });
        }
        Ok(())
    }

    /// Hangs up. The platform is told regardless of whether the session
    /// is still in the store, so a call surviving only on the remote
    /// side (after a relay restart) can still be ended.
    pub async fn terminate_call(&self, call_id: Option<&str>) -> Result<(), ActionError> {
        let call_id = require(call_id, "call_id")?;
        self.signaling().terminate(call_id).await?;

        if self.store().remove(call_id).is_some() {
            info!("Call {call_id} terminated locally");
            self.fanout().broadcast(&ClientEvent::CallTerminated {
                call_id: call_id.to_string(),
            });
        }
        Ok(())
    }

    /// Sorted snapshot of live sessions for listings.
    pub fn active_calls(&self) -> Vec<CallSummary> {
        let mut calls: Vec<CallSummary> = self
            .store()
            .active()
            .into_iter()
            .map(CallSummary::from)
            .collect();
        calls.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        calls
    }

    /// The stored SDP for a call: the remote offer when one exists,
    /// otherwise the answer.
    pub fn call_sdp(&self, call_id: &str) -> Option<String> {
        self.store()
            .get(call_id)
            .and_then(|session| session.sdp_offer.or(session.sdp_answer))
    }
}
