//! Process-wide relay hub.

use std::sync::Arc;

use crate::dispatch::{AnswerPolicy, AnswerProvider};
use crate::fanout::FanOut;
use crate::graph::SignalingClient;
use crate::store::SessionStore;

/// Process-wide hub tying the session store, the subscriber fan-out and
/// the signaling client together. Webhook dispatch and the call action
/// API are both implemented as methods on this type.
pub struct Relay {
    store: SessionStore,
    fanout: FanOut,
    signaling: Arc<dyn SignalingClient>,
    answer_policy: AnswerPolicy,
    answer_provider: Option<Arc<dyn AnswerProvider>>,
}

impl Relay {
    pub fn new(
        signaling: Arc<dyn SignalingClient>,
        answer_policy: AnswerPolicy,
        answer_provider: Option<Arc<dyn AnswerProvider>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: SessionStore::new(),
            fanout: FanOut::new(),
            signaling,
            answer_policy,
            answer_provider,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    pub(crate) fn signaling(&self) -> &Arc<dyn SignalingClient> {
        &self.signaling
    }

    pub(crate) fn answer_policy(&self) -> AnswerPolicy {
        self.answer_policy
    }

    pub(crate) fn answer_provider(&self) -> Option<&Arc<dyn AnswerProvider>> {
        self.answer_provider.as_ref()
    }
}
