//! Task orchestration core.
//!
//! Turns one natural-language instruction into agent assignments, status
//! transitions, and real-time client notifications:
//!
//! ```text
//! instruction -> interpret -> persist task -> assign agents -> spawn executors
//!                                                   |               |
//!                                                   v               v
//!                                              activity log    capability call
//!                                                   |               |
//!                                                   +----> notify <-+
//! ```
//!
//! Execution is fire-and-forget per sub-task: no backpressure, no retries,
//! no compensating actions. A failed external call marks its sub-task
//! failed and leaves siblings running.

mod dispatch;

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::capability::CapabilitySet;
use crate::interpreter::{InstructionInterpreter, InterpretError};
use crate::notify::ClientHub;
use crate::store::{ActivityKind, NewActivity, SharedStore};
use crate::task::{NewTask, Task, TaskStatus};

pub(crate) use dispatch::DispatchContext;

/// Errors surfaced to the instruction submitter.
///
/// Sub-task execution failures are not here: they happen after submission
/// returns and are reported through the store and the notifier.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("Failed to process instruction: {0}")]
    Interpret(#[from] InterpretError),

    #[error("Store error: {0}")]
    Store(String),
}

/// What submitting an instruction produced.
#[derive(Debug, Clone)]
pub struct InstructionOutcome {
    /// The task, as stored after assignment
    pub task: Task,
    /// Sub-tasks spawned for execution, in dispatch order
    pub subtask_ids: Vec<Uuid>,
}

/// The orchestration core.
pub struct Orchestrator {
    store: SharedStore,
    interpreter: Arc<dyn InstructionInterpreter>,
    capabilities: CapabilitySet,
    hub: Arc<ClientHub>,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        interpreter: Arc<dyn InstructionInterpreter>,
        capabilities: CapabilitySet,
        hub: Arc<ClientHub>,
    ) -> Self {
        Self {
            store,
            interpreter,
            capabilities,
            hub,
        }
    }

    fn context(&self) -> DispatchContext {
        DispatchContext {
            store: Arc::clone(&self.store),
            capabilities: self.capabilities.clone(),
            hub: Arc::clone(&self.hub),
        }
    }

    /// Interpret an instruction and dispatch its sub-tasks.
    ///
    /// Returns once every assignable step has been handed to an executor;
    /// execution itself continues in the background.
    pub async fn run_instruction(
        &self,
        user_id: &str,
        instruction: &str,
    ) -> Result<InstructionOutcome, OrchestrateError> {
        let ctx = self.context();

        let interpretation = match self.interpreter.interpret(instruction).await {
            Ok(interpretation) => interpretation,
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to interpret instruction");
                dispatch::record_activity(&ctx, NewActivity {
                    user_id: user_id.to_string(),
                    agent_id: None,
                    task_id: None,
                    kind: ActivityKind::System,
                    title: "Instruction processing failed".to_string(),
                    description: format!(
                        "Failed to process natural language instruction: {}",
                        e
                    ),
                    metadata: json!({ "error": e.to_string() }),
                })
                .await;
                return Err(e.into());
            }
        };

        if let Some(usage) = interpretation.usage {
            dispatch::bump_integration_usage(
                &ctx.store,
                "language_model",
                "tokens_used",
                usage.total_tokens as i64,
            )
            .await;
        }

        let plan = interpretation.plan;
        let task = self
            .store
            .create_task(NewTask {
                user_id: user_id.to_string(),
                instruction: instruction.to_string(),
                plan: plan.clone(),
            })
            .await
            .map_err(OrchestrateError::Store)?;

        dispatch::record_activity(&ctx, NewActivity {
            user_id: user_id.to_string(),
            agent_id: None,
            task_id: Some(task.id),
            kind: ActivityKind::System,
            title: "Natural language processed".to_string(),
            description: format!(
                "Parsed instruction into {} sub-tasks for agent execution",
                plan.steps.len()
            ),
            metadata: json!({
                "intent": plan.intent,
                "confidence": plan.confidence,
                "step_count": plan.steps.len(),
            }),
        })
        .await;

        let mut assignments = Vec::new();
        for &idx in &plan.execution_order {
            // The model's declared order may reference steps it never emitted.
            let Some(step) = plan.steps.get(idx) else {
                tracing::warn!(idx, "execution order references missing step, skipping");
                continue;
            };

            match dispatch::assign_step(&ctx, &task, step).await {
                Ok(Some(assignment)) => assignments.push(assignment),
                Ok(None) => {
                    tracing::warn!(kind = %step.kind, "no available agent for step, skipping");
                }
                Err(e) => return Err(OrchestrateError::Store(e)),
            }
        }

        let subtask_ids: Vec<Uuid> = assignments.iter().map(|(_, s)| s.id).collect();
        let assigned_agents: Vec<Uuid> = assignments.iter().map(|(a, _)| a.id).collect();

        // A task that dispatched nothing will never see an executor callback,
        // so it settles here: trivially complete for an empty plan, failed
        // when steps existed but no agent could take them.
        let status = if !subtask_ids.is_empty() {
            TaskStatus::InProgress
        } else if plan.steps.is_empty() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        // Must land before any executor runs its finalizer.
        self.store
            .set_task_assignment(task.id, status, &assigned_agents)
            .await
            .map_err(OrchestrateError::Store)?;

        for (agent, subtask) in assignments {
            let exec_ctx = ctx.clone();
            let user = user_id.to_string();
            let instruction = instruction.to_string();
            tokio::spawn(async move {
                dispatch::execute_subtask(exec_ctx, user, instruction, agent, subtask).await;
            });
        }

        self.hub
            .task_update(
                user_id,
                json!({
                    "task_id": task.id,
                    "status": status,
                    "instruction": instruction,
                    "intent": plan.intent,
                    "subtask_ids": subtask_ids,
                }),
            )
            .await;

        let task = self
            .store
            .get_task(task.id)
            .await
            .map_err(OrchestrateError::Store)?
            .ok_or_else(|| OrchestrateError::Store(format!("Task {} vanished", task.id)))?;

        Ok(InstructionOutcome { task, subtask_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::agents::{AgentKind, AgentStatus};
    use crate::capability::CapabilitySet;
    use crate::interpreter::{Interpretation, InterpretError};
    use crate::llm::{LlmError, TokenUsage};
    use crate::store::{ensure_seed_data, InMemoryStore};
    use crate::task::{InstructionPlan, PlannedStep};

    struct ScriptedInterpreter {
        plan: Option<InstructionPlan>,
    }

    #[async_trait]
    impl InstructionInterpreter for ScriptedInterpreter {
        async fn interpret(&self, _instruction: &str) -> Result<Interpretation, InterpretError> {
            match &self.plan {
                Some(plan) => Ok(Interpretation {
                    plan: plan.clone().normalized(),
                    usage: Some(TokenUsage {
                        prompt_tokens: 100,
                        completion_tokens: 50,
                        total_tokens: 150,
                    }),
                }),
                None => Err(InterpretError::Llm(LlmError::server_error(
                    503,
                    "model overloaded".to_string(),
                ))),
            }
        }
    }

    fn step(kind: AgentKind, action: &str) -> PlannedStep {
        PlannedStep {
            kind,
            action: action.to_string(),
            description: format!("{} step", action),
            parameters: json!({}),
            priority: 5,
            dependencies: vec![],
        }
    }

    fn two_step_plan() -> InstructionPlan {
        InstructionPlan {
            intent: "call and book".to_string(),
            steps: vec![
                step(AgentKind::Communication, "place_call"),
                step(AgentKind::Booking, "book_room"),
            ],
            confidence: 0.9,
            execution_order: vec![0, 1],
        }
    }

    async fn orchestrator_with(
        plan: Option<InstructionPlan>,
        succeed: bool,
    ) -> (Orchestrator, SharedStore) {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        ensure_seed_data(&store).await.unwrap();
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::new(ScriptedInterpreter { plan }),
            CapabilitySet::deterministic(succeed),
            Arc::new(ClientHub::new()),
        );
        (orchestrator, store)
    }

    async fn wait_for_terminal(store: &SharedStore, task_id: Uuid) -> Task {
        for _ in 0..200 {
            let task = store.get_task(task_id).await.unwrap().unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn test_instruction_runs_to_completion() {
        let (orchestrator, store) = orchestrator_with(Some(two_step_plan()), true).await;

        let outcome = orchestrator
            .run_instruction("alice", "call John and book a room")
            .await
            .unwrap();
        assert_eq!(outcome.subtask_ids.len(), 2);
        assert_eq!(outcome.task.status, TaskStatus::InProgress);
        assert_eq!(outcome.task.assigned_agents.len(), 2);

        let task = wait_for_terminal(&store, outcome.task.id).await;
        assert_eq!(task.status, TaskStatus::Completed);

        let subtasks = store.list_subtasks_for_task(task.id).await.unwrap();
        assert_eq!(subtasks.len(), 2);
        assert!(subtasks.iter().all(|s| s.status == TaskStatus::Completed));
        assert!(subtasks.iter().all(|s| s.started_at.is_some()));
        assert!(subtasks.iter().all(|s| s.result.is_some()));

        // Agents returned to the pool once their work drained.
        for agent in store.list_agents().await.unwrap() {
            assert_ne!(agent.status, AgentStatus::Busy, "{} still busy", agent.name);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_fails_parent_without_aborting_siblings() {
        let (orchestrator, store) = orchestrator_with(Some(two_step_plan()), false).await;

        let outcome = orchestrator
            .run_instruction("alice", "call John and book a room")
            .await
            .unwrap();

        let task = wait_for_terminal(&store, outcome.task.id).await;
        assert_eq!(task.status, TaskStatus::Failed);

        // Both sub-tasks ran to a terminal state; nothing was aborted.
        let subtasks = store.list_subtasks_for_task(task.id).await.unwrap();
        assert_eq!(subtasks.len(), 2);
        assert!(subtasks.iter().all(|s| s.status == TaskStatus::Failed));
        assert!(subtasks.iter().all(|s| s.completed_at.is_some()));
    }

    #[tokio::test]
    async fn test_busy_agents_cause_steps_to_be_skipped() {
        let (orchestrator, store) = orchestrator_with(
            Some(InstructionPlan {
                intent: "call someone".to_string(),
                steps: vec![step(AgentKind::Communication, "place_call")],
                confidence: 0.9,
                execution_order: vec![0],
            }),
            true,
        )
        .await;

        let comm = store
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.kind == AgentKind::Communication)
            .unwrap();
        store
            .update_agent_status(comm.id, AgentStatus::Busy, Some("other work"))
            .await
            .unwrap();

        let outcome = orchestrator
            .run_instruction("alice", "call John")
            .await
            .unwrap();

        assert!(outcome.subtask_ids.is_empty());
        assert_eq!(outcome.task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_out_of_range_execution_order_is_skipped() {
        let mut plan = two_step_plan();
        plan.execution_order = vec![0, 7, 1];
        let (orchestrator, store) = orchestrator_with(Some(plan), true).await;

        let outcome = orchestrator
            .run_instruction("alice", "call John and book a room")
            .await
            .unwrap();
        assert_eq!(outcome.subtask_ids.len(), 2);

        let task = wait_for_terminal(&store, outcome.task.id).await;
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_plan_completes_trivially() {
        let (orchestrator, _store) = orchestrator_with(
            Some(InstructionPlan {
                intent: "nothing to do".to_string(),
                steps: vec![],
                confidence: 0.5,
                execution_order: vec![],
            }),
            true,
        )
        .await;

        let outcome = orchestrator.run_instruction("alice", "hello").await.unwrap();
        assert!(outcome.subtask_ids.is_empty());
        assert_eq!(outcome.task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_interpretation_failure_is_logged_and_surfaced() {
        let (orchestrator, store) = orchestrator_with(None, true).await;

        let err = orchestrator
            .run_instruction("alice", "call John")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::Interpret(_)));

        let activities = store.list_activities("alice", 20).await.unwrap();
        assert!(activities
            .iter()
            .any(|a| a.title == "Instruction processing failed"));
    }

    #[tokio::test]
    async fn test_interpreter_tokens_are_metered() {
        let (orchestrator, store) = orchestrator_with(Some(two_step_plan()), true).await;

        orchestrator
            .run_instruction("alice", "call John and book a room")
            .await
            .unwrap();

        let row = store
            .get_integration("language_model")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.usage["tokens_used"], 150);
    }
}
