//! In-memory store (non-persistent).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{now_string, Activity, Integration, NewActivity, NewIntegration, Store, User};
use crate::agents::{Agent, AgentStatus, NewAgent};
use crate::task::{NewSubtask, NewTask, Subtask, SubtaskUpdate, Task, TaskStatus};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    agents: Arc<RwLock<HashMap<Uuid, Agent>>>,
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    subtasks: Arc<RwLock<HashMap<Uuid, Subtask>>>,
    activities: Arc<RwLock<HashMap<Uuid, Activity>>>,
    integrations: Arc<RwLock<HashMap<String, Integration>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn upsert_user(&self, user: User) -> Result<User, String> {
        let mut users = self.users.write().await;
        let stored = match users.get(&user.id) {
            Some(existing) => User {
                created_at: existing.created_at.clone(),
                updated_at: now_string(),
                ..user
            },
            None => user,
        };
        users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, String> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, String> {
        let mut agents: Vec<Agent> = self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, String> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn create_agent(&self, agent: NewAgent) -> Result<Agent, String> {
        let now = now_string();
        let agent = Agent {
            id: Uuid::new_v4(),
            name: agent.name,
            kind: agent.kind,
            status: AgentStatus::Idle,
            capabilities: agent.capabilities,
            current_task: None,
            stats: agent.stats,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.agents.write().await.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn update_agent_status(
        &self,
        id: Uuid,
        status: AgentStatus,
        current_task: Option<&str>,
    ) -> Result<(), String> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| format!("Agent {} not found", id))?;
        agent.status = status;
        agent.current_task = current_task.map(|s| s.to_string());
        agent.updated_at = now_string();
        Ok(())
    }

    async fn update_agent_stats(&self, id: Uuid, stats: serde_json::Value) -> Result<(), String> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| format!("Agent {} not found", id))?;
        agent.stats = stats;
        agent.updated_at = now_string();
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, String> {
        let now = now_string();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: task.user_id,
            instruction: task.instruction,
            plan: task.plan,
            status: TaskStatus::Pending,
            assigned_agents: vec![],
            results: serde_json::Value::Null,
            created_at: now.clone(),
            updated_at: now,
        };
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, String> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<Task>, String> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        results: Option<serde_json::Value>,
    ) -> Result<(), String> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| format!("Task {} not found", id))?;
        task.status = status;
        if let Some(results) = results {
            task.results = results;
        }
        task.updated_at = now_string();
        Ok(())
    }

    async fn set_task_assignment(
        &self,
        id: Uuid,
        status: TaskStatus,
        agents: &[Uuid],
    ) -> Result<(), String> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| format!("Task {} not found", id))?;
        task.status = status;
        task.assigned_agents = agents.to_vec();
        task.updated_at = now_string();
        Ok(())
    }

    async fn create_subtask(&self, subtask: NewSubtask) -> Result<Subtask, String> {
        let subtask = Subtask {
            id: Uuid::new_v4(),
            task_id: subtask.task_id,
            agent_id: subtask.agent_id,
            kind: subtask.kind,
            action: subtask.action,
            description: subtask.description,
            parameters: subtask.parameters,
            status: TaskStatus::Pending,
            result: None,
            started_at: None,
            completed_at: None,
            created_at: now_string(),
        };
        self.subtasks
            .write()
            .await
            .insert(subtask.id, subtask.clone());
        Ok(subtask)
    }

    async fn get_subtask(&self, id: Uuid) -> Result<Option<Subtask>, String> {
        Ok(self.subtasks.read().await.get(&id).cloned())
    }

    async fn list_subtasks_for_task(&self, task_id: Uuid) -> Result<Vec<Subtask>, String> {
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .read()
            .await
            .values()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subtasks)
    }

    async fn list_subtasks_for_agent(&self, agent_id: Uuid) -> Result<Vec<Subtask>, String> {
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .read()
            .await
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subtasks)
    }

    async fn update_subtask(&self, id: Uuid, update: SubtaskUpdate) -> Result<(), String> {
        let mut subtasks = self.subtasks.write().await;
        let subtask = subtasks
            .get_mut(&id)
            .ok_or_else(|| format!("Subtask {} not found", id))?;
        if let Some(status) = update.status {
            subtask.status = status;
        }
        if let Some(result) = update.result {
            subtask.result = Some(result);
        }
        if let Some(started_at) = update.started_at {
            subtask.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            subtask.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn create_activity(&self, activity: NewActivity) -> Result<Activity, String> {
        let activity = Activity {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            agent_id: activity.agent_id,
            task_id: activity.task_id,
            kind: activity.kind,
            title: activity.title,
            description: activity.description,
            metadata: activity.metadata,
            created_at: now_string(),
        };
        self.activities
            .write()
            .await
            .insert(activity.id, activity.clone());
        Ok(activity)
    }

    async fn list_activities(&self, user_id: &str, limit: usize) -> Result<Vec<Activity>, String> {
        let mut activities: Vec<Activity> = self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.truncate(limit);
        Ok(activities)
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>, String> {
        let mut integrations: Vec<Integration> = self
            .integrations
            .read()
            .await
            .values()
            .filter(|i| i.is_active)
            .cloned()
            .collect();
        integrations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(integrations)
    }

    async fn get_integration(&self, name: &str) -> Result<Option<Integration>, String> {
        Ok(self.integrations.read().await.get(name).cloned())
    }

    async fn create_integration(&self, integration: NewIntegration) -> Result<Integration, String> {
        let now = now_string();
        let integration = Integration {
            id: Uuid::new_v4(),
            name: integration.name,
            kind: integration.kind,
            status: integration.status,
            config: integration.config,
            usage: integration.usage,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.integrations
            .write()
            .await
            .insert(integration.name.clone(), integration.clone());
        Ok(integration)
    }

    async fn update_integration_usage(
        &self,
        name: &str,
        usage: serde_json::Value,
    ) -> Result<(), String> {
        let mut integrations = self.integrations.write().await;
        let integration = integrations
            .get_mut(name)
            .ok_or_else(|| format!("Integration {} not found", name))?;
        integration.usage = usage;
        integration.updated_at = now_string();
        Ok(())
    }
}
