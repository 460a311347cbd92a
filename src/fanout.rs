//! Event fan-out to real-time subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::mpsc;
use wacall_core::events::ClientEvent;

/// Per-subscriber queue depth. A subscriber this far behind gets
/// dropped instead of stalling the relay.
const SUBSCRIBER_QUEUE: usize = 64;

/// A subscriber's receiving end. Dropping it ends the subscription from
/// the fan-out's point of view on the next broadcast.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<Arc<str>>,
}

/// Broadcasts client events to every connected real-time subscriber.
///
/// Delivery is best-effort per subscriber: a full queue or a closed
/// channel removes that subscriber and never affects the others.
#[derive(Default)]
pub struct FanOut {
    subscribers: DashMap<u64, mpsc::Sender<Arc<str>>>,
    next_id: AtomicU64,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.subscribers.insert(id, tx);
        debug!("Subscriber {id} connected");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!("Subscriber {id} disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Serializes `event` once and hands the shared payload to every
    /// live subscriber. Never blocks and never fails.
    pub fn broadcast(&self, event: &ClientEvent) {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("Failed to serialize client event: {e}");
                return;
            }
        };

        // Snapshot the set first so subscribe/unsubscribe during
        // delivery cannot contend with the send loop.
        let targets: Vec<(u64, mpsc::Sender<Arc<str>>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, tx) in targets {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber {id} is not keeping up, dropping it");
                    self.subscribers.remove(&id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Subscriber {id} is gone, dropping it");
                    self.subscribers.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event() -> ClientEvent {
        ClientEvent::CallTerminated {
            call_id: "wacid.ABGGFjFVU2AfAgo6sHAAHA".to_string(),
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ok() {
        let fanout = FanOut::new();
        fanout.broadcast(&status_event());
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let fanout = FanOut::new();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);

        fanout.broadcast(&status_event());

        let a = first.rx.recv().await.unwrap();
        let b = second.rx.recv().await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"call_terminated\""));
    }

    #[test]
    fn test_closed_subscriber_is_pruned() {
        let fanout = FanOut::new();
        let keeper = fanout.subscribe();
        let leaver = fanout.subscribe();
        drop(leaver.rx);

        fanout.broadcast(&status_event());
        assert_eq!(fanout.subscriber_count(), 1);

        drop(keeper);
    }

    #[test]
    fn test_lagging_subscriber_is_dropped() {
        let fanout = FanOut::new();
        let subscription = fanout.subscribe();

        // One more than the queue holds; the last send finds it full.
        for _ in 0..=SUBSCRIBER_QUEUE {
            fanout.broadcast(&status_event());
        }
        assert_eq!(fanout.subscriber_count(), 0);

        drop(subscription);
    }

    #[test]
    fn test_unsubscribe_removes_entry() {
        let fanout = FanOut::new();
        let subscription = fanout.subscribe();
        fanout.unsubscribe(subscription.id);
        assert_eq!(fanout.subscriber_count(), 0);
    }
}
