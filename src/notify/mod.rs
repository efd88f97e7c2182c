//! Real-time notifier: per-user WebSocket fan-out.
//!
//! One persistent duplex connection per user; a newer connection for the
//! same user replaces the old one. Delivery is fire-and-forget: sends to
//! absent or disconnected users are dropped silently.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::store::{now_string, Activity};

/// How often the idle sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before its connection is dropped.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Messages a dashboard client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a user id
    Auth { user_id: String },
    /// Opt in to real-time updates
    Subscribe,
    /// Keepalive
    Ping,
}

/// Messages pushed to dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        status: String,
        timestamp: String,
    },
    Authenticated {
        user_id: String,
        timestamp: String,
    },
    Subscribed {
        message: String,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    Error {
        message: String,
    },
    AgentUpdate {
        data: serde_json::Value,
        timestamp: String,
    },
    TaskUpdate {
        data: serde_json::Value,
        timestamp: String,
    },
    NewActivity {
        data: serde_json::Value,
        timestamp: String,
    },
    SystemStatus {
        data: serde_json::Value,
        timestamp: String,
    },
}

impl ServerMessage {
    pub fn connected() -> Self {
        Self::Connection {
            status: "connected".to_string(),
            timestamp: now_string(),
        }
    }

    pub fn authenticated(user_id: &str) -> Self {
        Self::Authenticated {
            user_id: user_id.to_string(),
            timestamp: now_string(),
        }
    }

    pub fn subscribed() -> Self {
        Self::Subscribed {
            message: "Subscribed to real-time updates".to_string(),
            timestamp: now_string(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn agent_update(data: serde_json::Value) -> Self {
        Self::AgentUpdate {
            data,
            timestamp: now_string(),
        }
    }

    pub fn task_update(data: serde_json::Value) -> Self {
        Self::TaskUpdate {
            data,
            timestamp: now_string(),
        }
    }

    pub fn new_activity(data: serde_json::Value) -> Self {
        Self::NewActivity {
            data,
            timestamp: now_string(),
        }
    }

    pub fn system_status(data: serde_json::Value) -> Self {
        Self::SystemStatus {
            data,
            timestamp: now_string(),
        }
    }
}

/// Token identifying one registration; used so a stale connection's
/// teardown cannot evict the connection that replaced it.
pub type ConnectionToken = Uuid;

struct Client {
    token: ConnectionToken,
    tx: mpsc::UnboundedSender<ServerMessage>,
    last_seen: Instant,
}

/// Registry of connected dashboard clients, one slot per user.
#[derive(Default)]
pub struct ClientHub {
    clients: RwLock<HashMap<String, Client>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to `user_id`, replacing any previous connection.
    ///
    /// Returns the registration token and the receiving half the socket
    /// task should drain.
    pub async fn register(
        &self,
        user_id: &str,
    ) -> (ConnectionToken, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = Uuid::new_v4();
        let mut clients = self.clients.write().await;
        if clients
            .insert(
                user_id.to_string(),
                Client {
                    token,
                    tx,
                    last_seen: Instant::now(),
                },
            )
            .is_some()
        {
            tracing::debug!(user_id, "replaced existing dashboard connection");
        }
        (token, rx)
    }

    /// Record client traffic so the idle sweep leaves the connection alone.
    pub async fn touch(&self, user_id: &str) {
        if let Some(client) = self.clients.write().await.get_mut(user_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Remove a registration, but only if `token` still owns the slot.
    pub async fn unregister(&self, user_id: &str, token: ConnectionToken) {
        let mut clients = self.clients.write().await;
        if clients.get(user_id).map(|c| c.token) == Some(token) {
            clients.remove(user_id);
            tracing::debug!(user_id, "dashboard client disconnected");
        }
    }

    /// Number of live connections.
    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Send a message to one user. Absent or closed connections are dropped.
    pub async fn send(&self, user_id: &str, message: ServerMessage) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(user_id) {
            if client.tx.send(message).is_err() {
                clients.remove(user_id);
            }
        }
    }

    /// Drop connections that have been silent longer than `timeout`.
    pub async fn sweep_idle(&self, timeout: Duration) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|user_id, client| {
            let keep = client.last_seen.elapsed() <= timeout;
            if !keep {
                tracing::info!(user_id = %user_id, "dropping idle dashboard connection");
            }
            keep
        });
        before - clients.len()
    }

    /// Spawn the periodic idle sweep.
    pub fn start_sweeper(self: Arc<Self>) {
        let hub = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                hub.sweep_idle(IDLE_TIMEOUT).await;
            }
        });
    }

    // Typed broadcast helpers used by the orchestrator.

    pub async fn agent_update(&self, user_id: &str, data: serde_json::Value) {
        self.send(user_id, ServerMessage::agent_update(data)).await;
    }

    pub async fn task_update(&self, user_id: &str, data: serde_json::Value) {
        self.send(user_id, ServerMessage::task_update(data)).await;
    }

    pub async fn activity(&self, user_id: &str, activity: &Activity) {
        let data = serde_json::to_value(activity).unwrap_or(serde_json::Value::Null);
        self.send(user_id, ServerMessage::new_activity(data)).await;
    }

    pub async fn system_status(&self, user_id: &str, data: serde_json::Value) {
        self.send(user_id, ServerMessage::system_status(data)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_reaches_registered_client() {
        let hub = ClientHub::new();
        let (_token, mut rx) = hub.register("alice").await;

        hub.task_update("alice", json!({ "task_id": "t1" })).await;

        match rx.recv().await.unwrap() {
            ServerMessage::TaskUpdate { data, .. } => assert_eq!(data["task_id"], "t1"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_absent_user_is_dropped() {
        let hub = ClientHub::new();
        // No registration; must not panic or error.
        hub.task_update("ghost", json!({})).await;
        assert_eq!(hub.connected_count().await, 0);
    }

    #[tokio::test]
    async fn test_new_connection_replaces_old() {
        let hub = ClientHub::new();
        let (_old_token, mut old_rx) = hub.register("alice").await;
        let (_new_token, mut new_rx) = hub.register("alice").await;

        hub.send("alice", ServerMessage::pong()).await;

        // Old channel is disconnected from the hub; new one receives.
        assert!(new_rx.recv().await.is_some());
        assert!(old_rx.try_recv().is_err());
        assert_eq!(hub.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_leaves_replacement_alone() {
        let hub = ClientHub::new();
        let (old_token, _old_rx) = hub.register("alice").await;
        let (_new_token, _new_rx) = hub.register("alice").await;

        hub.unregister("alice", old_token).await;
        assert_eq!(hub.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_idle_sweep_drops_silent_clients() {
        let hub = ClientHub::new();
        let (_token, _rx) = hub.register("alice").await;

        assert_eq!(hub.sweep_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(hub.sweep_idle(Duration::ZERO).await, 1);
        assert_eq!(hub.connected_count().await, 0);
    }

    #[test]
    fn test_wire_format() {
        let msg = ServerMessage::task_update(json!({ "status": "completed" }));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "task_update");
        assert_eq!(value["data"]["status"], "completed");
        assert!(value["timestamp"].is_string());

        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","user_id":"alice"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Auth { user_id } if user_id == "alice"));
    }
}
