//! WebSocket subscriber endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use crate::broadcast::{BroadcastHub, ConnectionMessage};
use crate::server::state::AppState;

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /ws
#[allow(clippy::unused_async)] // axum handlers must be async
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

async fn handle_connection(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = hub.register();
    let id = subscription.id();

    let hello = match serde_json::to_string(&ConnectionMessage::connected()) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!("Failed to serialize connection message: {err}");
            hub.unregister(id);
            return;
        }
    };
    if let Err(err) = sender.send(Message::Text(hello.into())).await {
        tracing::warn!(subscriber = %id, "Failed to send connection message: {err}");
        hub.unregister(id);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        loop {
            tokio::select! {
                frame = subscription.recv() => {
                    // `None` means the hub dropped this subscriber.
                    let Some(frame) = frame else {
                        if let Err(err) = sender.send(Message::Close(None)).await {
                            tracing::debug!(subscriber = %id, "Failed to send close frame: {err}");
                        }
                        break;
                    };
                    if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(bytes::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(value) => tracing::debug!(subscriber = %id, "Received client message: {value}"),
                    Err(err) => tracing::warn!(subscriber = %id, "Unparsable client message: {err}"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(subscriber = %id, "WebSocket error: {err}");
                    break;
                }
            }
        }
    });

    // Whichever half ends first closes the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    hub.unregister(id);
}
