//! WebSocket subscriber endpoint.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use wacall_core::events::ClientEvent;

use super::AppState;

pub(super) async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// Pushes fan-out frames to one client until either side goes away.
/// The protocol is one-way: inbound frames are drained and ignored so
/// pings and strays do not back up the socket.
async fn client_session(socket: WebSocket, state: AppState) {
    let relay = state.relay;
    let mut subscription = relay.fanout().subscribe();
    let subscriber_id = subscription.id;
    let _cleanup = scopeguard::guard(relay.clone(), move |relay| {
        relay.fanout().unsubscribe(subscriber_id);
    });

    let (mut sink, mut stream) = socket.split();

    let greeting = ClientEvent::Connected {
        active_calls: relay.store().len(),
    };
    let Ok(frame) = serde_json::to_string(&greeting) else {
        return;
    };
    if sink.send(Message::Text(frame.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.rx.recv() => {
                match event {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // The fan-out dropped us, most likely for lagging.
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("WebSocket session for subscriber {subscriber_id} closed");
}
