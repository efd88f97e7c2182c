//! Dashboard WebSocket transport.
//!
//! The wire protocol lives in `crate::notify`; this module only moves
//! messages between one socket and the hub. A connection starts anonymous
//! and binds to a user slot on `auth`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::routes::AppState;
use crate::notify::{ClientHub, ClientMessage, ConnectionToken, ServerMessage};

pub(crate) async fn dashboard_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// One authenticated binding of this socket to a user slot.
struct Session {
    user_id: String,
    token: ConnectionToken,
    /// Pumps hub messages into the socket's outbound channel
    forward: JoinHandle<()>,
}

impl Session {
    async fn teardown(self, hub: &ClientHub) {
        self.forward.abort();
        hub.unregister(&self.user_id, self.token).await;
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<ClientHub>) {
    let (sender, mut receiver) = socket.split();

    // A single writer task owns the sink; everything else goes through the
    // outbound channel.
    let (out_tx, out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(write_outbound(sender, out_rx));

    let _ = out_tx.send(ServerMessage::connected());

    let mut session: Option<Session> = None;

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "websocket receive error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Auth { user_id }) => {
                if user_id.trim().is_empty() {
                    let _ = out_tx.send(ServerMessage::error("User ID required"));
                    continue;
                }

                // Re-auth on the same socket drops the previous binding.
                if let Some(old) = session.take() {
                    old.teardown(&hub).await;
                }

                let (token, mut hub_rx) = hub.register(&user_id).await;
                let forward_tx = out_tx.clone();
                let forward = tokio::spawn(async move {
                    while let Some(message) = hub_rx.recv().await {
                        if forward_tx.send(message).is_err() {
                            break;
                        }
                    }
                });

                tracing::info!(user_id = %user_id, "dashboard client authenticated");
                let _ = out_tx.send(ServerMessage::authenticated(&user_id));
                session = Some(Session {
                    user_id,
                    token,
                    forward,
                });
            }
            Ok(ClientMessage::Subscribe) => match &session {
                Some(session) => {
                    hub.touch(&session.user_id).await;
                    let _ = out_tx.send(ServerMessage::subscribed());
                }
                None => {
                    let _ = out_tx.send(ServerMessage::error("Not authenticated"));
                }
            },
            Ok(ClientMessage::Ping) => {
                if let Some(session) = &session {
                    hub.touch(&session.user_id).await;
                }
                let _ = out_tx.send(ServerMessage::pong());
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid websocket message");
            }
        }
    }

    if let Some(session) = session {
        session.teardown(&hub).await;
    }
    writer.abort();
}

/// Serialize and write outbound messages until either side goes away.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = rx.recv().await {
        let text = serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string());
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}
