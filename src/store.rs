//! Live call session store.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use wacall_core::session::{CallDirection, CallSession, SessionError, SessionPatch};

/// Concurrency-safe map of live call sessions, keyed by call id.
///
/// A mutation holds the entry's shard lock for the whole
/// read-modify-write, so two events racing on the same call id are
/// serialized and neither update is lost. Different call ids never
/// contend with each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, CallSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    /// Merges `patch` into the session for `call_id`, creating the
    /// session first when the id is unknown. A failed patch leaves the
    /// store exactly as it was, including not inserting a fresh entry.
    pub fn upsert(
        &self,
        call_id: &str,
        direction: CallDirection,
        patch: SessionPatch,
    ) -> Result<CallSession, SessionError> {
        match self.sessions.entry(call_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().apply(patch)?;
                Ok(occupied.get().clone())
            }
            Entry::Vacant(vacant) => {
                let mut session = CallSession::new(call_id, direction);
                session.apply(patch)?;
                Ok(vacant.insert(session).value().clone())
            }
        }
    }

    /// Patches an existing session. `Ok(None)` means the id is unknown,
    /// which callers treat as a stale event rather than an error.
    pub fn update(
        &self,
        call_id: &str,
        patch: SessionPatch,
    ) -> Result<Option<CallSession>, SessionError> {
        match self.sessions.get_mut(call_id) {
            Some(mut entry) => {
                entry.apply(patch)?;
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    pub fn remove(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.remove(call_id).map(|(_, session)| session)
    }

    /// Snapshot of every session that has not reached a terminal state.
    pub fn active(&self) -> Vec<CallSession> {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().state.is_terminal())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacall_core::session::CallState;

    const CALL_ID: &str = "wacid.ABGGFjFVU2AfAgo6sHAAHA";

    #[test]
    fn test_upsert_creates_then_merges() {
        let store = SessionStore::new();

        let created = store
            .upsert(
                CALL_ID,
                CallDirection::Inbound,
                SessionPatch {
                    sdp_offer: Some("v=0 offer".to_string()),
                    peer: Some("15551234567".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.state, CallState::Incoming);
        assert_eq!(store.len(), 1);

        // A duplicate connect merges into the same record.
        let merged = store
            .upsert(
                CALL_ID,
                CallDirection::Inbound,
                SessionPatch {
                    tracking_data: Some("crm-7712".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(merged.sdp_offer.as_deref(), Some("v=0 offer"));
        assert_eq!(merged.tracking_data.as_deref(), Some("crm-7712"));
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let store = SessionStore::new();
        let result = store
            .update(
                "wacid.UNSEEN",
                SessionPatch {
                    state: Some(CallState::Ringing),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_patch_changes_nothing() {
        let store = SessionStore::new();
        store
            .upsert(CALL_ID, CallDirection::Inbound, SessionPatch::default())
            .unwrap();
        store
            .update(
                CALL_ID,
                SessionPatch {
                    state: Some(CallState::Accepted),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = store.update(
            CALL_ID,
            SessionPatch {
                state: Some(CallState::Ringing),
                peer: Some("15551234567".to_string()),
                ..Default::default()
            },
        );
        assert!(err.is_err());

        let session = store.get(CALL_ID).unwrap();
        assert_eq!(session.state, CallState::Accepted);
        assert!(session.peer.is_none());
    }

    #[test]
    fn test_failed_create_inserts_nothing() {
        let store = SessionStore::new();
        // An answer with no offer is invalid for an inbound session, so
        // the entry created for the merge must be rolled back.
        let err = store.upsert(
            CALL_ID,
            CallDirection::Inbound,
            SessionPatch {
                sdp_answer: Some("v=0 answer".to_string()),
                ..Default::default()
            },
        );
        assert!(err.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        store
            .upsert(CALL_ID, CallDirection::Outbound, SessionPatch::default())
            .unwrap();

        assert!(store.remove(CALL_ID).is_some());
        assert!(store.remove(CALL_ID).is_none());
        assert!(store.get(CALL_ID).is_none());
    }

    #[test]
    fn test_concurrent_merges_on_one_id_lose_nothing() {
        let store = SessionStore::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..50 {
                        store
                            .upsert(
                                CALL_ID,
                                CallDirection::Inbound,
                                SessionPatch {
                                    sdp_offer: Some(format!("v=0 offer {i}")),
                                    ..Default::default()
                                },
                            )
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 1);
        assert!(store.get(CALL_ID).unwrap().sdp_offer.is_some());
    }

    #[test]
    fn test_active_excludes_nothing_live() {
        let store = SessionStore::new();
        store
            .upsert("wacid.A", CallDirection::Inbound, SessionPatch::default())
            .unwrap();
        store
            .upsert("wacid.B", CallDirection::Outbound, SessionPatch::default())
            .unwrap();
        assert_eq!(store.active().len(), 2);
    }
}
