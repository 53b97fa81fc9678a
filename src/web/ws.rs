// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! WebSocket subscribers
//!
//! Each socket is registered with the [`Broadcaster`](crate::broadcast::Broadcaster)
//! through a bounded [`ChannelConnection`]. The broadcaster replays the cache
//! into the queue before any live message, and this task drains the queue
//! into the socket as JSON text frames.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{debug, warn};

use super::AppState;
use crate::broadcast::ChannelConnection;

/// Envelopes a socket may have queued before it counts as stalled
const SEND_QUEUE_CAPACITY: usize = 256;

pub async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let broadcaster = state.pipeline.broadcaster();
    let (connection, mut queue) = ChannelConnection::new(SEND_QUEUE_CAPACITY);

    let id = match broadcaster.connect(Arc::new(connection)).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Could not replay cache to new subscriber: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            queued = queue.recv() => {
                // The broadcaster dropped us (closed or stalled)
                let Some(envelope) = queued else {
                    debug!("Subscriber {} removed by broadcaster", id);
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };

                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize envelope: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    debug!("Subscriber {} send failed", id);
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring message from subscriber {}: {}", id, text);
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error for subscriber {}: {}", id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    broadcaster.disconnect(id).await;
}
