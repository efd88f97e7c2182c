//! Sub-tasks: one planned step bound to an agent.
//!
//! A sub-task is created at assignment time and executed fire-and-forget.
//! Failure of one sub-task never aborts its siblings and triggers no
//! compensating actions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskStatus;
use crate::agents::AgentKind;

/// A sub-task dispatched to a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,

    /// Parent task
    pub task_id: Uuid,

    /// Agent executing this sub-task
    pub agent_id: Uuid,

    pub kind: AgentKind,

    /// Action name from the planned step
    pub action: String,

    pub description: String,

    /// Free-form parameters from the planned step
    pub parameters: serde_json::Value,

    pub status: TaskStatus,

    /// Capability outcome (success or failure payload)
    pub result: Option<serde_json::Value>,

    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// Fields for inserting a new sub-task.
#[derive(Debug, Clone)]
pub struct NewSubtask {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub kind: AgentKind,
    pub action: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Partial update applied as a sub-task moves through its lifecycle.
#[derive(Debug, Clone, Default)]
pub struct SubtaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl SubtaskUpdate {
    /// Update marking the sub-task as started.
    pub fn started(now: String) -> Self {
        Self {
            status: Some(TaskStatus::InProgress),
            started_at: Some(now),
            ..Default::default()
        }
    }

    /// Update marking the sub-task as completed with a result payload.
    pub fn completed(result: serde_json::Value, now: String) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            result: Some(result),
            completed_at: Some(now),
            ..Default::default()
        }
    }

    /// Update marking the sub-task as failed with an error payload.
    pub fn failed(result: serde_json::Value, now: String) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            result: Some(result),
            completed_at: Some(now),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle_updates_carry_timestamps() {
        let started = SubtaskUpdate::started("t1".to_string());
        assert_eq!(started.status, Some(TaskStatus::InProgress));
        assert_eq!(started.started_at.as_deref(), Some("t1"));
        assert!(started.completed_at.is_none());

        let done = SubtaskUpdate::completed(json!({ "success": true }), "t2".to_string());
        assert_eq!(done.status, Some(TaskStatus::Completed));
        assert_eq!(done.completed_at.as_deref(), Some("t2"));

        let failed = SubtaskUpdate::failed(json!({ "error": "no answer" }), "t3".to_string());
        assert_eq!(failed.status, Some(TaskStatus::Failed));
        assert!(failed.result.is_some());
    }
}
