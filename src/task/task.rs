//! Core Task type: one user instruction and its lifecycle.
//!
//! # Invariants
//! - Status only moves Pending -> InProgress -> {Completed | Failed}
//! - `assigned_agents` is only written once dispatch has decided assignments

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::InstructionPlan;

/// Status of a task or sub-task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> InProgress -> Completed
///                      \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be dispatched
    Pending,
    /// At least one sub-task is executing
    InProgress,
    /// Every sub-task completed successfully
    Completed,
    /// Interpretation failed, or at least one sub-task failed
    Failed,
}

impl TaskStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A task: one natural-language instruction and the plan derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    /// Owning user (opaque identity, supplied by the caller)
    pub user_id: String,

    /// The instruction exactly as the user typed it
    pub instruction: String,

    /// The interpreter's decomposition of the instruction
    pub plan: InstructionPlan,

    pub status: TaskStatus,

    /// Agents that received sub-tasks for this instruction
    pub assigned_agents: Vec<Uuid>,

    /// Aggregated sub-task results, keyed by sub-task id
    pub results: serde_json::Value,

    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Transition to InProgress.
    ///
    /// # Errors
    /// Returns `Err` if the task is not Pending.
    pub fn start(&mut self) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::Pending => {
                self.status = TaskStatus::InProgress;
                Ok(())
            }
            other => Err(TaskError::InvalidTransition {
                from: other,
                to: TaskStatus::InProgress,
            }),
        }
    }

    /// Transition to Completed.
    ///
    /// # Errors
    /// Returns `Err` if the task is not InProgress.
    pub fn complete(&mut self) -> Result<(), TaskError> {
        match self.status {
            TaskStatus::InProgress => {
                self.status = TaskStatus::Completed;
                Ok(())
            }
            other => Err(TaskError::InvalidTransition {
                from: other,
                to: TaskStatus::Completed,
            }),
        }
    }

    /// Transition to Failed. Valid from any non-terminal state, since
    /// interpretation failures kill a task that never started dispatching.
    pub fn fail(&mut self) -> Result<(), TaskError> {
        if self.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.status = TaskStatus::Failed;
        Ok(())
    }
}

/// Fields for inserting a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: String,
    pub instruction: String,
    pub plan: InstructionPlan,
}

/// Errors that can occur during task operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: "local".to_string(),
            instruction: "call John and book a room".to_string(),
            plan: InstructionPlan::default(),
            status: TaskStatus::Pending,
            assigned_agents: vec![],
            results: serde_json::Value::Null,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = sample_task();
        task.start().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        task.complete().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_cannot_complete_pending_task() {
        let mut task = sample_task();
        assert!(task.complete().is_err());
    }

    #[test]
    fn test_fail_from_pending_and_in_progress() {
        let mut task = sample_task();
        task.fail().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);

        let mut task = sample_task();
        task.start().unwrap();
        task.fail().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = sample_task();
        task.start().unwrap();
        task.complete().unwrap();
        assert!(task.start().is_err());
        assert!(task.fail().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
