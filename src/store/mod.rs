//! Persistence module with pluggable backends.
//!
//! Flat tables: users, agents, tasks, subtasks, activities, integrations.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database, self-initializing schema

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::{default_agents, Agent, AgentStatus, NewAgent};
use crate::task::{NewSubtask, NewTask, Subtask, SubtaskUpdate, Task, TaskStatus};

/// A dashboard user. Identity is opaque; authentication happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Minimal user record for an opaque id.
    pub fn bare(id: impl Into<String>) -> Self {
        let now = now_string();
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Category of an activity feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// An agent did something
    AgentAction,
    /// A task changed state
    TaskUpdate,
    /// Orchestrator-level event
    System,
}

/// An entry in the real-time activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: String,
    pub agent_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Fields for inserting a new activity.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: String,
    pub agent_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Which external concern an integration row tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    Telephony,
    Calendar,
    Email,
    Chat,
    LanguageModel,
}

/// Connection health of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Connected,
    Disconnected,
    Error,
}

/// Status row for one external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    /// Stable slug used as the lookup key (e.g. `telephony`)
    pub name: String,
    pub kind: IntegrationKind,
    pub status: IntegrationStatus,
    pub config: serde_json::Value,
    /// Usage counters, shape varies by kind
    pub usage: serde_json::Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for inserting a new integration.
#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub name: String,
    pub kind: IntegrationKind,
    pub status: IntegrationStatus,
    pub config: serde_json::Value,
    pub usage: serde_json::Value,
}

/// Get current timestamp as RFC3339 string.
pub fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// Store trait - implemented by all storage backends.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    // Users
    async fn upsert_user(&self, user: User) -> Result<User, String>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, String>;

    // Agents
    /// List active agents.
    async fn list_agents(&self) -> Result<Vec<Agent>, String>;
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, String>;
    async fn create_agent(&self, agent: NewAgent) -> Result<Agent, String>;
    async fn update_agent_status(
        &self,
        id: Uuid,
        status: AgentStatus,
        current_task: Option<&str>,
    ) -> Result<(), String>;
    async fn update_agent_stats(&self, id: Uuid, stats: serde_json::Value) -> Result<(), String>;

    // Tasks
    async fn create_task(&self, task: NewTask) -> Result<Task, String>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, String>;
    /// List a user's tasks, newest first.
    async fn list_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<Task>, String>;
    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        results: Option<serde_json::Value>,
    ) -> Result<(), String>;
    /// Record which agents were assigned and move the task along.
    async fn set_task_assignment(
        &self,
        id: Uuid,
        status: TaskStatus,
        agents: &[Uuid],
    ) -> Result<(), String>;

    // Subtasks
    async fn create_subtask(&self, subtask: NewSubtask) -> Result<Subtask, String>;
    async fn get_subtask(&self, id: Uuid) -> Result<Option<Subtask>, String>;
    async fn list_subtasks_for_task(&self, task_id: Uuid) -> Result<Vec<Subtask>, String>;
    async fn list_subtasks_for_agent(&self, agent_id: Uuid) -> Result<Vec<Subtask>, String>;
    async fn update_subtask(&self, id: Uuid, update: SubtaskUpdate) -> Result<(), String>;

    // Activities
    async fn create_activity(&self, activity: NewActivity) -> Result<Activity, String>;
    /// List a user's activities, newest first.
    async fn list_activities(&self, user_id: &str, limit: usize) -> Result<Vec<Activity>, String>;

    // Integrations
    async fn list_integrations(&self) -> Result<Vec<Integration>, String>;
    async fn get_integration(&self, name: &str) -> Result<Option<Integration>, String>;
    async fn create_integration(&self, integration: NewIntegration) -> Result<Integration, String>;
    async fn update_integration_usage(
        &self,
        name: &str,
        usage: serde_json::Value,
    ) -> Result<(), String>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn Store>;

/// Store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    #[default]
    Sqlite,
}

impl StoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }
}

/// Create a store based on type and configuration.
pub async fn create_store(store_type: StoreType, data_dir: PathBuf) -> Result<SharedStore, String> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreType::Sqlite => {
            let store = SqliteStore::new(data_dir).await?;
            Ok(Arc::new(store))
        }
    }
}

/// The default integration rows, one per external concern.
pub fn default_integrations() -> Vec<NewIntegration> {
    vec![
        NewIntegration {
            name: "telephony".to_string(),
            kind: IntegrationKind::Telephony,
            status: IntegrationStatus::Connected,
            config: json!({ "provider": "mock" }),
            usage: json!({ "calls_today": 0, "calls_limit": 100 }),
        },
        NewIntegration {
            name: "calendar".to_string(),
            kind: IntegrationKind::Calendar,
            status: IntegrationStatus::Connected,
            config: json!({ "provider": "mock" }),
            usage: json!({ "events_scheduled": 0, "events_limit": 50 }),
        },
        NewIntegration {
            name: "email".to_string(),
            kind: IntegrationKind::Email,
            status: IntegrationStatus::Connected,
            config: json!({ "provider": "mock" }),
            usage: json!({ "emails_sent": 0, "emails_limit": 100 }),
        },
        NewIntegration {
            name: "chat".to_string(),
            kind: IntegrationKind::Chat,
            status: IntegrationStatus::Connected,
            config: json!({ "provider": "mock" }),
            usage: json!({ "messages_posted": 0 }),
        },
        NewIntegration {
            name: "language_model".to_string(),
            kind: IntegrationKind::LanguageModel,
            status: IntegrationStatus::Connected,
            config: json!({ "provider": "openai" }),
            usage: json!({ "tokens_used": 0, "tokens_limit": 100000 }),
        },
    ]
}

/// Seed the default agents and integrations on first start.
///
/// Skipped entirely if any rows already exist, so restarts never duplicate.
pub async fn ensure_seed_data(store: &SharedStore) -> Result<(), String> {
    if store.list_agents().await?.is_empty() {
        for agent in default_agents() {
            store.create_agent(agent).await?;
        }
        tracing::info!("Seeded default agent roster");
    }

    if store.list_integrations().await?.is_empty() {
        for integration in default_integrations() {
            store.create_integration(integration).await?;
        }
        tracing::info!("Seeded default integrations");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::task::InstructionPlan;

    fn new_task_for(user: &str) -> NewTask {
        NewTask {
            user_id: user.to_string(),
            instruction: "call John".to_string(),
            plan: InstructionPlan::default(),
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        ensure_seed_data(&store).await.unwrap();
        ensure_seed_data(&store).await.unwrap();

        assert_eq!(store.list_agents().await.unwrap().len(), 3);
        assert_eq!(store.list_integrations().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tasks_are_created_pending() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let task = store.create_task(new_task_for("alice")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agents.is_empty());
    }

    #[tokio::test]
    async fn test_task_listing_is_scoped_to_user() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        store.create_task(new_task_for("alice")).await.unwrap();
        store.create_task(new_task_for("alice")).await.unwrap();
        store.create_task(new_task_for("bob")).await.unwrap();

        assert_eq!(store.list_tasks("alice", 50).await.unwrap().len(), 2);
        assert_eq!(store.list_tasks("bob", 50).await.unwrap().len(), 1);
        assert!(store.list_tasks("carol", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_status_round_trip() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        ensure_seed_data(&store).await.unwrap();

        let agent = store
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.kind == AgentKind::Booking)
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);

        store
            .update_agent_status(agent.id, AgentStatus::Busy, Some("Reserve a room"))
            .await
            .unwrap();

        let updated = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(updated.status, AgentStatus::Busy);
        assert_eq!(updated.current_task.as_deref(), Some("Reserve a room"));
    }

    #[tokio::test]
    async fn test_integration_usage_update() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        ensure_seed_data(&store).await.unwrap();

        store
            .update_integration_usage("telephony", json!({ "calls_today": 7, "calls_limit": 100 }))
            .await
            .unwrap();

        let row = store.get_integration("telephony").await.unwrap().unwrap();
        assert_eq!(row.usage["calls_today"], 7);
    }
}
