//! Webhook call event dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use wacall_core::events::ClientEvent;
use wacall_core::session::{CallDirection, CallState, SessionPatch};
use wacall_core::webhook::{
    CallEvent, CallNotification, CallStatusKind, StatusNotification, WEBHOOK_OBJECT, WebhookPayload,
};

use crate::relay::Relay;

/// What the relay does on its own when an inbound call arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerPolicy {
    /// Wait for a connected client to drive preaccept/accept explicitly.
    #[default]
    Manual,
    /// Signal media readiness early, leave the final accept to a client.
    PreAccept,
    /// Answer the call end to end without client involvement.
    Accept,
}

impl std::str::FromStr for AnswerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(AnswerPolicy::Manual),
            "preaccept" | "pre_accept" => Ok(AnswerPolicy::PreAccept),
            "accept" => Ok(AnswerPolicy::Accept),
            other => Err(format!("unknown answer policy: {other}")),
        }
    }
}

/// Produces an SDP answer for an inbound offer. Answering is
/// nondeterministic-latency work, so the dispatcher always runs it on a
/// spawned task, never on the webhook path.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    async fn answer(&self, call_id: &str, sdp_offer: &str) -> anyhow::Result<String>;
}

impl Relay {
    /// Applies one webhook delivery to the relay, strictly in array
    /// order. Runs after the HTTP 200 has already been sent, so nothing
    /// in here can affect delivery acknowledgment.
    pub async fn process_webhook(self: &Arc<Self>, payload: WebhookPayload) {
        if !payload.object.is_empty() && payload.object != WEBHOOK_OBJECT {
            debug!("Ignoring webhook for object {}", payload.object);
            return;
        }
        for entry in payload.entry {
            for change in entry.changes {
                if !change.field.is_empty() && change.field != "calls" {
                    debug!("Ignoring webhook change for field {}", change.field);
                    continue;
                }
                for call in change.value.calls {
                    self.apply_call_event(call);
                }
                for status in change.value.statuses {
                    self.apply_status_event(status);
                }
            }
        }
    }

    fn apply_call_event(self: &Arc<Self>, call: CallNotification) {
        let Some(event) = call.classify() else {
            warn!("Unknown call event {:?} for call {}", call.event, call.id);
            return;
        };
        debug!("Received {} event for call {}", event, call.id);
        match event {
            CallEvent::Connect => self.handle_connect(call),
            CallEvent::Terminate => self.handle_terminate(&call.id),
            CallEvent::Status(kind) => self.apply_status(&call.id, kind),
        }
    }

    /// Connect is the only event allowed to create a session: inbound it
    /// carries the remote offer, outbound the remote answer.
    fn handle_connect(self: &Arc<Self>, call: CallNotification) {
        let direction = call.direction();
        let sdp = call.sdp().map(str::to_string);
        let patch = match direction {
            CallDirection::Inbound => SessionPatch {
                state: Some(CallState::Incoming),
                sdp_offer: sdp,
                peer: call.from.clone(),
                ..Default::default()
            },
            CallDirection::Outbound => SessionPatch {
                state: Some(CallState::Connecting),
                sdp_answer: sdp,
                peer: call.to.clone(),
                ..Default::default()
            },
        };

        let session = match self.store().upsert(&call.id, direction, patch) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding connect event for call {}: {}", call.id, e);
                return;
            }
        };

        match direction {
            CallDirection::Inbound => {
                info!(
                    "Incoming call {} from {}",
                    session.call_id,
                    session.peer.as_deref().unwrap_or("unknown")
                );
                self.fanout().broadcast(&ClientEvent::IncomingCall {
                    call_id: session.call_id.clone(),
                    from: session.peer.clone(),
                    sdp_offer: session.sdp_offer.clone(),
                });
                self.maybe_auto_answer(&session.call_id, session.sdp_offer.as_deref());
            }
            CallDirection::Outbound => {
                info!("Call {} connected", session.call_id);
                self.fanout().broadcast(&ClientEvent::CallConnect {
                    call_id: session.call_id.clone(),
                    sdp: session.sdp_answer.clone(),
                });
            }
        }
    }

    fn handle_terminate(&self, call_id: &str) {
        match self.store().remove(call_id) {
            Some(session) => {
                info!("Call {} terminated (last state {})", call_id, session.state);
                self.fanout().broadcast(&ClientEvent::CallTerminated {
                    call_id: call_id.to_string(),
                });
            }
            None => debug!("Stale terminate for unknown call {call_id}"),
        }
    }

    fn apply_status_event(&self, status: StatusNotification) {
        match status.classify() {
            Some(kind) => self.apply_status(&status.id, kind),
            None => warn!(
                "Unknown call status {:?} for call {}",
                status.status, status.id
            ),
        }
    }

    fn apply_status(&self, call_id: &str, kind: CallStatusKind) {
        let state = kind.as_state();
        let patch = SessionPatch {
            state: Some(state),
            ..Default::default()
        };
        match self.store().update(call_id, patch) {
            Ok(Some(session)) => {
                info!("Call {} status {}", call_id, session.state);
                self.fanout().broadcast(&ClientEvent::CallStatus {
                    call_id: call_id.to_string(),
                    status: session.state,
                });
            }
            Ok(None) => debug!("Stale status {state} for unknown call {call_id}"),
            Err(e) => warn!("Discarding status {state} for call {call_id}: {e}"),
        }
    }

    /// Kicks off policy-driven answering for an inbound call. The
    /// provider runs on its own task; its failure is logged, never
    /// propagated, and a client can still answer the call manually.
    fn maybe_auto_answer(self: &Arc<Self>, call_id: &str, sdp_offer: Option<&str>) {
        let policy = self.answer_policy();
        if policy == AnswerPolicy::Manual {
            return;
        }
        let Some(provider) = self.answer_provider().cloned() else {
            warn!(
                "Answer policy {policy:?} is set but no answer provider is configured; call {call_id} waits for a client"
            );
            return;
        };
        let Some(offer) = sdp_offer.map(str::to_string) else {
            warn!("Call {call_id} arrived without an SDP offer; cannot auto-answer");
            return;
        };

        let relay = Arc::clone(self);
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            let answer = match provider.answer(&call_id, &offer).await {
                Ok(answer) => answer,
                Err(e) => {
                    error!("Answer provider failed for call {call_id}: {e:#}");
                    return;
                }
            };
            if let Err(e) = relay.preaccept_call(Some(&call_id), Some(&answer)).await {
                error!("Auto pre-accept failed for call {call_id}: {e}");
                return;
            }
            if policy == AnswerPolicy::Accept {
                if let Err(e) = relay.accept_call(Some(&call_id), Some(&answer)).await {
                    error!("Auto accept failed for call {call_id}: {e}");
                }
            }
        });
    }
}
