//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{InstructionPlan, Subtask, Task, TaskStatus};

/// Request to submit a new instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// The instruction in plain language
    pub instruction: String,
}

/// Response after submitting an instruction.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskResponse {
    /// Unique task identifier
    pub task_id: Uuid,

    /// Task status after dispatch
    pub status: TaskStatus,

    /// The interpreter's decomposition
    pub plan: InstructionPlan,

    /// Sub-tasks spawned for execution, in dispatch order
    pub subtask_ids: Vec<Uuid>,
}

/// One task with its sub-tasks.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetailResponse {
    pub task: Task,
    pub subtasks: Vec<Subtask>,
}

/// Statistics response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Total number of tasks the caller has created
    pub total_tasks: usize,

    /// Number of currently running tasks
    pub active_tasks: usize,

    /// Number of completed tasks
    pub completed_tasks: usize,

    /// Number of failed tasks
    pub failed_tasks: usize,

    /// Success rate over finished tasks (0.0 - 1.0)
    pub success_rate: f64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether the configured store survives restarts
    pub store_persistent: bool,

    /// Model used by the instruction interpreter
    pub interpreter_model: String,
}

/// Error payload returned by all handlers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}
