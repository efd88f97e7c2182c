//! SQLite-backed store.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    now_string, Activity, ActivityKind, Integration, IntegrationKind, IntegrationStatus,
    NewActivity, NewIntegration, Store, User,
};
use crate::agents::{Agent, AgentKind, AgentStatus, NewAgent};
use crate::task::{InstructionPlan, NewSubtask, NewTask, Subtask, SubtaskUpdate, Task, TaskStatus};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT,
    display_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'idle',
    capabilities TEXT NOT NULL DEFAULT '[]',
    current_task TEXT,
    stats TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    instruction TEXT NOT NULL,
    plan TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    assigned_agents TEXT NOT NULL DEFAULT '[]',
    results TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_created ON tasks(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS subtasks (
    id TEXT PRIMARY KEY NOT NULL,
    task_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    action TEXT NOT NULL,
    description TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    result TEXT,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_subtasks_task ON subtasks(task_id, created_at);
CREATE INDEX IF NOT EXISTS idx_subtasks_agent ON subtasks(agent_id, created_at DESC);

CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    agent_id TEXT,
    task_id TEXT,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_user_created ON activities(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS integrations (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'connected',
    config TEXT NOT NULL DEFAULT '{}',
    usage TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self, String> {
        let db_path = data_dir.join("agentdesk.db");

        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| format!("Failed to create data dir: {}", e))?;

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| format!("Failed to open SQLite database: {}", e))?;

            conn.execute_batch(SCHEMA)
                .map_err(|e| format!("Failed to run schema: {}", e))?;

            Ok::<_, String>(conn)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn agent_status_to_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "idle",
        AgentStatus::Active => "active",
        AgentStatus::Busy => "busy",
        AgentStatus::Error => "error",
    }
}

fn parse_agent_status(s: &str) -> AgentStatus {
    match s {
        "active" => AgentStatus::Active,
        "busy" => AgentStatus::Busy,
        "error" => AgentStatus::Error,
        _ => AgentStatus::Idle,
    }
}

fn agent_kind_to_str(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Communication => "communication",
        AgentKind::Booking => "booking",
        AgentKind::Followup => "followup",
    }
}

fn parse_agent_kind(s: &str) -> AgentKind {
    match s {
        "booking" => AgentKind::Booking,
        "followup" => AgentKind::Followup,
        _ => AgentKind::Communication,
    }
}

fn activity_kind_to_str(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::AgentAction => "agent_action",
        ActivityKind::TaskUpdate => "task_update",
        ActivityKind::System => "system",
    }
}

fn parse_activity_kind(s: &str) -> ActivityKind {
    match s {
        "agent_action" => ActivityKind::AgentAction,
        "task_update" => ActivityKind::TaskUpdate,
        _ => ActivityKind::System,
    }
}

fn integration_kind_to_str(kind: IntegrationKind) -> &'static str {
    match kind {
        IntegrationKind::Telephony => "telephony",
        IntegrationKind::Calendar => "calendar",
        IntegrationKind::Email => "email",
        IntegrationKind::Chat => "chat",
        IntegrationKind::LanguageModel => "language_model",
    }
}

fn parse_integration_kind(s: &str) -> IntegrationKind {
    match s {
        "calendar" => IntegrationKind::Calendar,
        "email" => IntegrationKind::Email,
        "chat" => IntegrationKind::Chat,
        "language_model" => IntegrationKind::LanguageModel,
        _ => IntegrationKind::Telephony,
    }
}

fn integration_status_to_str(status: IntegrationStatus) -> &'static str {
    match status {
        IntegrationStatus::Connected => "connected",
        IntegrationStatus::Disconnected => "disconnected",
        IntegrationStatus::Error => "error",
    }
}

fn parse_integration_status(s: &str) -> IntegrationStatus {
    match s {
        "disconnected" => IntegrationStatus::Disconnected,
        "error" => IntegrationStatus::Error,
        _ => IntegrationStatus::Connected,
    }
}

fn json_or_null(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let capabilities_json: String = row.get(4)?;
    let stats_json: String = row.get(6)?;

    Ok(Agent {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        name: row.get(1)?,
        kind: parse_agent_kind(&kind_str),
        status: parse_agent_status(&status_str),
        capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
        current_task: row.get(5)?,
        stats: serde_json::from_str(&stats_json).unwrap_or(serde_json::Value::Null),
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id_str: String = row.get(0)?;
    let plan_json: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let agents_json: String = row.get(5)?;
    let results_json: Option<String> = row.get(6)?;

    let plan: InstructionPlan = serde_json::from_str(&plan_json).unwrap_or_default();
    let assigned_agents: Vec<Uuid> = serde_json::from_str(&agents_json).unwrap_or_default();

    Ok(Task {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        user_id: row.get(1)?,
        instruction: row.get(2)?,
        plan,
        status: parse_task_status(&status_str),
        assigned_agents,
        results: json_or_null(results_json).unwrap_or(serde_json::Value::Null),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn subtask_from_row(row: &Row<'_>) -> rusqlite::Result<Subtask> {
    let id_str: String = row.get(0)?;
    let task_id_str: String = row.get(1)?;
    let agent_id_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let parameters_json: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let result_json: Option<String> = row.get(8)?;

    Ok(Subtask {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        task_id: Uuid::parse_str(&task_id_str).unwrap_or_default(),
        agent_id: Uuid::parse_str(&agent_id_str).unwrap_or_default(),
        kind: parse_agent_kind(&kind_str),
        action: row.get(4)?,
        description: row.get(5)?,
        parameters: serde_json::from_str(&parameters_json).unwrap_or(serde_json::Value::Null),
        status: parse_task_status(&status_str),
        result: json_or_null(result_json),
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let id_str: String = row.get(0)?;
    let agent_id_str: Option<String> = row.get(2)?;
    let task_id_str: Option<String> = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let metadata_json: String = row.get(7)?;

    Ok(Activity {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        user_id: row.get(1)?,
        agent_id: agent_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        task_id: task_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        kind: parse_activity_kind(&kind_str),
        title: row.get(5)?,
        description: row.get(6)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        created_at: row.get(8)?,
    })
}

fn integration_from_row(row: &Row<'_>) -> rusqlite::Result<Integration> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let config_json: String = row.get(4)?;
    let usage_json: String = row.get(5)?;

    Ok(Integration {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        name: row.get(1)?,
        kind: parse_integration_kind(&kind_str),
        status: parse_integration_status(&status_str),
        config: serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null),
        usage: serde_json::from_str(&usage_json).unwrap_or(serde_json::Value::Null),
        is_active: row.get::<_, i32>(6)? != 0,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const AGENT_COLUMNS: &str =
    "id, name, kind, status, capabilities, current_task, stats, is_active, created_at, updated_at";
const TASK_COLUMNS: &str =
    "id, user_id, instruction, plan, status, assigned_agents, results, created_at, updated_at";
const SUBTASK_COLUMNS: &str = "id, task_id, agent_id, kind, action, description, parameters, status, result, started_at, completed_at, created_at";
const ACTIVITY_COLUMNS: &str =
    "id, user_id, agent_id, task_id, kind, title, description, metadata, created_at";
const INTEGRATION_COLUMNS: &str =
    "id, name, kind, status, config, usage, is_active, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn upsert_user(&self, user: User) -> Result<User, String> {
        let conn = self.conn.clone();
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO users (id, email, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     email = excluded.email,
                     display_name = excluded.display_name,
                     updated_at = excluded.updated_at",
                params![user.id, user.email, user.display_name, now],
            )
            .map_err(|e| e.to_string())?;

            conn.query_row(
                "SELECT id, email, display_name, created_at, updated_at FROM users WHERE id = ?1",
                params![user.id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, String> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT id, email, display_name, created_at, updated_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM agents WHERE is_active = 1 ORDER BY created_at",
                    AGENT_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let agents = stmt
                .query_map([], agent_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(agents)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
                params![id_str],
                agent_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_agent(&self, agent: NewAgent) -> Result<Agent, String> {
        let conn = self.conn.clone();
        let now = now_string();
        let record = Agent {
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
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO agents (id, name, kind, status, capabilities, current_task, stats, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, 1, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.name,
                    agent_kind_to_str(record.kind),
                    agent_status_to_str(record.status),
                    serde_json::to_string(&record.capabilities).unwrap_or_else(|_| "[]".into()),
                    record.stats.to_string(),
                    record.created_at,
                    record.updated_at,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(record)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn update_agent_status(
        &self,
        id: Uuid,
        status: AgentStatus,
        current_task: Option<&str>,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        let current_task = current_task.map(|s| s.to_string());
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE agents SET status = ?2, current_task = ?3, updated_at = ?4 WHERE id = ?1",
                    params![id_str, agent_status_to_str(status), current_task, now],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Agent {} not found", id_str));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn update_agent_stats(&self, id: Uuid, stats: serde_json::Value) -> Result<(), String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE agents SET stats = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id_str, stats.to_string(), now],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Agent {} not found", id_str));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, String> {
        let conn = self.conn.clone();
        let now = now_string();
        let record = Task {
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
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO tasks (id, user_id, instruction, plan, status, assigned_agents, results, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '[]', NULL, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.user_id,
                    record.instruction,
                    serde_json::to_string(&record.plan).unwrap_or_else(|_| "{}".into()),
                    task_status_to_str(record.status),
                    record.created_at,
                    record.updated_at,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(record)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id_str],
                task_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<Task>, String> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                    TASK_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let tasks = stmt
                .query_map(params![user_id, limit as i64], task_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(tasks)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        results: Option<serde_json::Value>,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        let results = results.map(|v| v.to_string());
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE tasks SET status = ?2, results = COALESCE(?3, results), updated_at = ?4
                     WHERE id = ?1",
                    params![id_str, task_status_to_str(status), results, now],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Task {} not found", id_str));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn set_task_assignment(
        &self,
        id: Uuid,
        status: TaskStatus,
        agents: &[Uuid],
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        let agents_json =
            serde_json::to_string(&agents.to_vec()).unwrap_or_else(|_| "[]".into());
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE tasks SET status = ?2, assigned_agents = ?3, updated_at = ?4 WHERE id = ?1",
                    params![id_str, task_status_to_str(status), agents_json, now],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Task {} not found", id_str));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_subtask(&self, subtask: NewSubtask) -> Result<Subtask, String> {
        let conn = self.conn.clone();
        let record = Subtask {
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
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO subtasks (id, task_id, agent_id, kind, action, description, parameters, status, result, started_at, completed_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, ?9)",
                params![
                    record.id.to_string(),
                    record.task_id.to_string(),
                    record.agent_id.to_string(),
                    agent_kind_to_str(record.kind),
                    record.action,
                    record.description,
                    record.parameters.to_string(),
                    task_status_to_str(record.status),
                    record.created_at,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(record)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn get_subtask(&self, id: Uuid) -> Result<Option<Subtask>, String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM subtasks WHERE id = ?1", SUBTASK_COLUMNS),
                params![id_str],
                subtask_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_subtasks_for_task(&self, task_id: Uuid) -> Result<Vec<Subtask>, String> {
        let conn = self.conn.clone();
        let task_id_str = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM subtasks WHERE task_id = ?1 ORDER BY created_at",
                    SUBTASK_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let subtasks = stmt
                .query_map(params![task_id_str], subtask_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(subtasks)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_subtasks_for_agent(&self, agent_id: Uuid) -> Result<Vec<Subtask>, String> {
        let conn = self.conn.clone();
        let agent_id_str = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM subtasks WHERE agent_id = ?1 ORDER BY created_at DESC",
                    SUBTASK_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let subtasks = stmt
                .query_map(params![agent_id_str], subtask_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(subtasks)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn update_subtask(&self, id: Uuid, update: SubtaskUpdate) -> Result<(), String> {
        let conn = self.conn.clone();
        let id_str = id.to_string();
        let status = update.status.map(task_status_to_str);
        let result = update.result.map(|v| v.to_string());
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE subtasks SET
                         status = COALESCE(?2, status),
                         result = COALESCE(?3, result),
                         started_at = COALESCE(?4, started_at),
                         completed_at = COALESCE(?5, completed_at)
                     WHERE id = ?1",
                    params![id_str, status, result, update.started_at, update.completed_at],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Subtask {} not found", id_str));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_activity(&self, activity: NewActivity) -> Result<Activity, String> {
        let conn = self.conn.clone();
        let record = Activity {
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
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO activities (id, user_id, agent_id, task_id, kind, title, description, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.user_id,
                    record.agent_id.map(|id| id.to_string()),
                    record.task_id.map(|id| id.to_string()),
                    activity_kind_to_str(record.kind),
                    record.title,
                    record.description,
                    record.metadata.to_string(),
                    record.created_at,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(record)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_activities(&self, user_id: &str, limit: usize) -> Result<Vec<Activity>, String> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM activities WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                    ACTIVITY_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let activities = stmt
                .query_map(params![user_id, limit as i64], activity_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(activities)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM integrations WHERE is_active = 1 ORDER BY created_at",
                    INTEGRATION_COLUMNS
                ))
                .map_err(|e| e.to_string())?;

            let integrations = stmt
                .query_map([], integration_from_row)
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            Ok(integrations)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn get_integration(&self, name: &str) -> Result<Option<Integration>, String> {
        let conn = self.conn.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM integrations WHERE name = ?1", INTEGRATION_COLUMNS),
                params![name],
                integration_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_integration(&self, integration: NewIntegration) -> Result<Integration, String> {
        let conn = self.conn.clone();
        let now = now_string();
        let record = Integration {
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
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO integrations (id, name, kind, status, config, usage, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.name,
                    integration_kind_to_str(record.kind),
                    integration_status_to_str(record.status),
                    record.config.to_string(),
                    record.usage.to_string(),
                    record.created_at,
                    record.updated_at,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(record)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn update_integration_usage(
        &self,
        name: &str,
        usage: serde_json::Value,
    ) -> Result<(), String> {
        let conn = self.conn.clone();
        let name = name.to_string();
        let now = now_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let changed = conn
                .execute(
                    "UPDATE integrations SET usage = ?2, updated_at = ?3 WHERE name = ?1",
                    params![name, usage.to_string(), now],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("Integration {} not found", name));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_agents;
    use crate::task::InstructionPlan;
    use serde_json::json;

    async fn fresh_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::new(dir.path().to_path_buf())
            .await
            .expect("store");
        (store, dir)
    }

    #[tokio::test]
    async fn test_task_round_trip() {
        let (store, _dir) = fresh_store().await;

        let task = store
            .create_task(NewTask {
                user_id: "alice".to_string(),
                instruction: "book a room".to_string(),
                plan: InstructionPlan::default(),
            })
            .await
            .unwrap();

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.instruction, "book a room");
        assert_eq!(loaded.status, TaskStatus::Pending);

        store
            .set_task_assignment(task.id, TaskStatus::InProgress, &[Uuid::new_v4()])
            .await
            .unwrap();
        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::InProgress);
        assert_eq!(loaded.assigned_agents.len(), 1);
    }

    #[tokio::test]
    async fn test_subtask_lifecycle_persists() {
        let (store, _dir) = fresh_store().await;

        let agents = {
            let mut created = vec![];
            for agent in default_agents() {
                created.push(store.create_agent(agent).await.unwrap());
            }
            created
        };

        let task = store
            .create_task(NewTask {
                user_id: "alice".to_string(),
                instruction: "call John".to_string(),
                plan: InstructionPlan::default(),
            })
            .await
            .unwrap();

        let subtask = store
            .create_subtask(NewSubtask {
                task_id: task.id,
                agent_id: agents[0].id,
                kind: agents[0].kind,
                action: "place_call".to_string(),
                description: "Call John about the meeting".to_string(),
                parameters: json!({ "to": "John" }),
            })
            .await
            .unwrap();

        store
            .update_subtask(subtask.id, SubtaskUpdate::started(now_string()))
            .await
            .unwrap();
        store
            .update_subtask(
                subtask.id,
                SubtaskUpdate::completed(json!({ "success": true }), now_string()),
            )
            .await
            .unwrap();

        let loaded = store.get_subtask(subtask.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert!(loaded.started_at.is_some());
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.result.unwrap()["success"], true);

        let for_task = store.list_subtasks_for_task(task.id).await.unwrap();
        assert_eq!(for_task.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_rows_is_an_error() {
        let (store, _dir) = fresh_store().await;
        assert!(store
            .update_agent_status(Uuid::new_v4(), AgentStatus::Busy, None)
            .await
            .is_err());
        assert!(store
            .update_task_status(Uuid::new_v4(), TaskStatus::Failed, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_user_upsert_preserves_created_at() {
        let (store, _dir) = fresh_store().await;

        let first = store.upsert_user(User::bare("alice")).await.unwrap();
        let mut update = User::bare("alice");
        update.email = Some("alice@example.com".to_string());
        let second = store.upsert_user(update).await.unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.email.as_deref(), Some("alice@example.com"));
    }
}
