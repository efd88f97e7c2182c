//! Assignment and execution of individual sub-tasks.
//!
//! `assign_step` binds a planned step to an available agent; spawned
//! `execute_subtask` calls drive the assign -> execute -> notify sequence
//! for one sub-task each, with no coordination between them.

use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::{Agent, AgentKind, AgentStatus};
use crate::capability::{
    CallRequest, CapabilityError, CapabilitySet, EmailRequest, EventRequest, NotificationPhase,
    TaskNotification,
};
use crate::notify::ClientHub;
use crate::store::{now_string, ActivityKind, NewActivity, SharedStore};
use crate::task::{NewSubtask, PlannedStep, Subtask, SubtaskUpdate, Task, TaskStatus};

/// Everything an executor needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub store: SharedStore,
    pub capabilities: CapabilitySet,
    pub hub: Arc<ClientHub>,
}

/// Bind a planned step to an available agent of the matching kind.
///
/// Returns `Ok(None)` when every agent of that kind is busy; the step is
/// skipped, not queued.
pub(crate) async fn assign_step(
    ctx: &DispatchContext,
    task: &Task,
    step: &PlannedStep,
) -> Result<Option<(Agent, Subtask)>, String> {
    let agents = ctx.store.list_agents().await?;
    let Some(agent) = agents
        .into_iter()
        .find(|a| a.kind == step.kind && a.status.is_available())
    else {
        return Ok(None);
    };

    ctx.store
        .update_agent_status(agent.id, AgentStatus::Busy, Some(&step.description))
        .await?;

    let subtask = ctx
        .store
        .create_subtask(NewSubtask {
            task_id: task.id,
            agent_id: agent.id,
            kind: step.kind,
            action: step.action.clone(),
            description: step.description.clone(),
            parameters: step.parameters.clone(),
        })
        .await?;

    record_activity(
        ctx,
        NewActivity {
            user_id: task.user_id.clone(),
            agent_id: Some(agent.id),
            task_id: Some(task.id),
            kind: ActivityKind::AgentAction,
            title: format!("Task assigned to {} agent", step.kind),
            description: step.description.clone(),
            metadata: json!({ "action": step.action, "parameters": step.parameters }),
        },
    )
    .await;

    ctx.hub
        .agent_update(
            &task.user_id,
            json!({
                "agent_id": agent.id,
                "status": AgentStatus::Busy,
                "current_task": step.description,
            }),
        )
        .await;

    Ok(Some((agent, subtask)))
}

/// What one capability invocation produced.
struct Invocation {
    success: bool,
    payload: Value,
    summary: String,
}

/// Drive one sub-task from start to a terminal state.
///
/// Never returns an error: every failure lands in the store and the
/// activity feed instead.
pub(crate) async fn execute_subtask(
    ctx: DispatchContext,
    user_id: String,
    instruction: String,
    agent: Agent,
    subtask: Subtask,
) {
    let task_id = subtask.task_id;

    if let Err(e) = ctx
        .store
        .update_subtask(subtask.id, SubtaskUpdate::started(now_string()))
        .await
    {
        tracing::error!(subtask_id = %subtask.id, error = %e, "failed to mark subtask started");
    }
    ctx.hub
        .task_update(
            &user_id,
            json!({
                "task_id": task_id,
                "subtask_id": subtask.id,
                "agent_id": agent.id,
                "status": TaskStatus::InProgress,
            }),
        )
        .await;

    notify_chat(
        &ctx,
        TaskNotification {
            task_id,
            instruction: instruction.clone(),
            agent_kind: agent.kind,
            phase: NotificationPhase::Started,
            details: None,
        },
    )
    .await;

    let invocation = match invoke_capability(&ctx, &subtask).await {
        Ok(invocation) => invocation,
        Err(e) => {
            tracing::error!(subtask_id = %subtask.id, error = %e, "capability call failed");
            Invocation {
                success: false,
                payload: json!({ "error": e.to_string() }),
                summary: e.to_string(),
            }
        }
    };

    let update = if invocation.success {
        SubtaskUpdate::completed(invocation.payload.clone(), now_string())
    } else {
        SubtaskUpdate::failed(invocation.payload.clone(), now_string())
    };
    let terminal_status = update.status.unwrap_or(TaskStatus::Failed);

    if let Err(e) = ctx.store.update_subtask(subtask.id, update).await {
        tracing::error!(subtask_id = %subtask.id, error = %e, "failed to record subtask outcome");
    }

    bump_agent_stats(&ctx.store, agent.id, agent.kind, invocation.success).await;
    release_agent_if_drained(&ctx, &user_id, agent.id).await;

    let (success_title, failure_title) = match agent.kind {
        AgentKind::Communication => ("Call completed", "Call failed"),
        AgentKind::Booking => ("Booking confirmed", "Booking failed"),
        AgentKind::Followup => ("Follow-up emails sent", "Follow-up emails failed"),
    };
    record_activity(
        &ctx,
        NewActivity {
            user_id: user_id.clone(),
            agent_id: Some(agent.id),
            task_id: Some(task_id),
            kind: ActivityKind::AgentAction,
            title: if invocation.success {
                success_title.to_string()
            } else {
                failure_title.to_string()
            },
            description: invocation.summary,
            metadata: json!({
                "subtask_id": subtask.id,
                "action": subtask.action,
                "success": invocation.success,
            }),
        },
    )
    .await;

    ctx.hub
        .task_update(
            &user_id,
            json!({
                "task_id": task_id,
                "subtask_id": subtask.id,
                "agent_id": agent.id,
                "status": terminal_status,
            }),
        )
        .await;

    notify_chat(
        &ctx,
        TaskNotification {
            task_id,
            instruction,
            agent_kind: agent.kind,
            phase: if invocation.success {
                NotificationPhase::Completed
            } else {
                NotificationPhase::Failed
            },
            details: Some(invocation.payload),
        },
    )
    .await;

    finalize_task_if_settled(&ctx, &user_id, task_id).await;
}

/// Invoke the capability matching the sub-task's kind.
async fn invoke_capability(
    ctx: &DispatchContext,
    subtask: &Subtask,
) -> Result<Invocation, CapabilityError> {
    let params = &subtask.parameters;
    match subtask.kind {
        AgentKind::Communication => {
            let request = CallRequest {
                to: param_str(params, &["to", "contact", "phone"])
                    .unwrap_or_else(|| "unknown contact".to_string()),
                message: param_str(params, &["message"])
                    .unwrap_or_else(|| subtask.description.clone()),
            };
            let outcome = ctx.capabilities.telephony.place_call(request).await?;
            bump_integration_usage(&ctx.store, "telephony", "calls_today", 1).await;
            Ok(Invocation {
                success: outcome.success,
                summary: outcome.note.clone(),
                payload: serde_json::to_value(&outcome).unwrap_or(Value::Null),
            })
        }
        AgentKind::Booking => {
            let request = EventRequest {
                summary: param_str(params, &["summary", "title"])
                    .unwrap_or_else(|| subtask.description.clone()),
                description: Some(subtask.description.clone()),
                when: param_str(params, &["when", "time", "start"]),
                attendees: param_list(params, &["attendees", "participants"]),
                location: param_str(params, &["location", "room"]),
            };
            let outcome = ctx.capabilities.calendar.create_event(request).await?;
            bump_integration_usage(&ctx.store, "calendar", "events_scheduled", 1).await;
            let summary = if outcome.success {
                format!(
                    "Reserved {} ({})",
                    outcome.room.as_deref().unwrap_or("a room"),
                    outcome.time_slot.as_deref().unwrap_or("unspecified slot"),
                )
            } else {
                "Booking attempt was rejected".to_string()
            };
            Ok(Invocation {
                success: outcome.success,
                summary,
                payload: serde_json::to_value(&outcome).unwrap_or(Value::Null),
            })
        }
        AgentKind::Followup => {
            let request = EmailRequest {
                to: param_list(params, &["to", "recipients", "attendees"]),
                subject: param_str(params, &["subject"])
                    .unwrap_or_else(|| subtask.description.clone()),
                body: param_str(params, &["body", "message"])
                    .unwrap_or_else(|| subtask.description.clone()),
            };
            let outcome = ctx.capabilities.mailer.send_email(request).await?;
            bump_integration_usage(&ctx.store, "email", "emails_sent", outcome.sent as i64).await;
            Ok(Invocation {
                success: outcome.success,
                summary: outcome.delivery_note.clone(),
                payload: serde_json::to_value(&outcome).unwrap_or(Value::Null),
            })
        }
    }
}

/// Post a chat notification; failures are logged, never propagated.
async fn notify_chat(ctx: &DispatchContext, notification: TaskNotification) {
    match ctx
        .capabilities
        .chat
        .post_task_notification(notification)
        .await
    {
        Ok(outcome) if outcome.success => {
            bump_integration_usage(&ctx.store, "chat", "messages_posted", 1).await;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "chat notification failed"),
    }
}

/// Return the agent to the pool once it has no pending sub-tasks left.
async fn release_agent_if_drained(ctx: &DispatchContext, user_id: &str, agent_id: Uuid) {
    let subtasks = match ctx.store.list_subtasks_for_agent(agent_id).await {
        Ok(subtasks) => subtasks,
        Err(e) => {
            tracing::error!(%agent_id, error = %e, "failed to list agent subtasks");
            return;
        }
    };

    let pending = subtasks
        .iter()
        .filter(|s| s.status == TaskStatus::Pending)
        .count();
    if pending > 0 {
        return;
    }

    if let Err(e) = ctx
        .store
        .update_agent_status(agent_id, AgentStatus::Active, None)
        .await
    {
        tracing::error!(%agent_id, error = %e, "failed to release agent");
        return;
    }

    ctx.hub
        .agent_update(
            user_id,
            json!({ "agent_id": agent_id, "status": AgentStatus::Active }),
        )
        .await;
}

/// Finalize the parent task once every sibling is terminal.
///
/// Two executors finishing together may both observe the settled set; the
/// resulting double write is idempotent.
async fn finalize_task_if_settled(ctx: &DispatchContext, user_id: &str, task_id: Uuid) {
    let siblings = match ctx.store.list_subtasks_for_task(task_id).await {
        Ok(siblings) => siblings,
        Err(e) => {
            tracing::error!(%task_id, error = %e, "failed to list task subtasks");
            return;
        }
    };

    if siblings.is_empty() || !siblings.iter().all(|s| s.status.is_terminal()) {
        return;
    }

    let all_completed = siblings.iter().all(|s| s.status == TaskStatus::Completed);
    let status = if all_completed {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };

    let results: serde_json::Map<String, Value> = siblings
        .iter()
        .map(|s| {
            (
                s.id.to_string(),
                s.result.clone().unwrap_or(Value::Null),
            )
        })
        .collect();
    let results = Value::Object(results);

    if let Err(e) = ctx
        .store
        .update_task_status(task_id, status, Some(results.clone()))
        .await
    {
        tracing::error!(%task_id, error = %e, "failed to finalize task");
        return;
    }

    record_activity(
        ctx,
        NewActivity {
            user_id: user_id.to_string(),
            agent_id: None,
            task_id: Some(task_id),
            kind: ActivityKind::TaskUpdate,
            title: if all_completed {
                "Task completed".to_string()
            } else {
                "Task completed with failures".to_string()
            },
            description: format!("All {} sub-tasks reached a terminal state", siblings.len()),
            metadata: json!({ "status": status }),
        },
    )
    .await;

    ctx.hub
        .task_update(
            user_id,
            json!({ "task_id": task_id, "status": status, "results": results }),
        )
        .await;
}

/// Persist and push an activity; persistence failure is logged, not fatal.
pub(crate) async fn record_activity(ctx: &DispatchContext, activity: NewActivity) {
    let user_id = activity.user_id.clone();
    match ctx.store.create_activity(activity).await {
        Ok(stored) => ctx.hub.activity(&user_id, &stored).await,
        Err(e) => tracing::error!(error = %e, "failed to record activity"),
    }
}

/// Read-modify-write a numeric usage counter on an integration row.
pub(crate) async fn bump_integration_usage(
    store: &SharedStore,
    name: &str,
    field: &str,
    delta: i64,
) {
    let integration = match store.get_integration(name).await {
        Ok(Some(integration)) => integration,
        Ok(None) => {
            tracing::warn!(name, "integration row missing, usage not recorded");
            return;
        }
        Err(e) => {
            tracing::error!(name, error = %e, "failed to load integration");
            return;
        }
    };

    let mut usage = integration.usage;
    bump_field(&mut usage, field, delta);
    if let Err(e) = store.update_integration_usage(name, usage).await {
        tracing::error!(name, error = %e, "failed to update integration usage");
    }
}

/// Bump the per-agent performance counters after an invocation.
async fn bump_agent_stats(store: &SharedStore, agent_id: Uuid, kind: AgentKind, success: bool) {
    let agent = match store.get_agent(agent_id).await {
        Ok(Some(agent)) => agent,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(%agent_id, error = %e, "failed to load agent for stats");
            return;
        }
    };

    let mut stats = agent.stats;
    match kind {
        AgentKind::Communication => {
            bump_field(&mut stats, "total_calls", 1);
            if success {
                bump_field(&mut stats, "calls_today", 1);
            }
        }
        AgentKind::Booking => {
            bump_field(&mut stats, "total_bookings", 1);
            if success {
                bump_field(&mut stats, "bookings_today", 1);
            }
        }
        AgentKind::Followup => {
            bump_field(&mut stats, "total_emails", 1);
            if success {
                bump_field(&mut stats, "emails_sent", 1);
            }
        }
    }

    if let Err(e) = store.update_agent_stats(agent_id, stats).await {
        tracing::error!(%agent_id, error = %e, "failed to update agent stats");
    }
}

fn bump_field(value: &mut Value, key: &str, delta: i64) {
    if let Value::Object(map) = value {
        let current = map.get(key).and_then(Value::as_i64).unwrap_or(0);
        map.insert(key.to_string(), json!(current + delta));
    }
}

/// First string value found under any of `keys`.
fn param_str(params: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        params
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    })
}

/// First list of strings found under any of `keys`. A bare string counts
/// as a one-element list.
fn param_list(params: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match params.get(key) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_string())
                    .collect();
            }
            Some(Value::String(s)) => return vec![s.clone()],
            _ => {}
        }
    }
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_str_checks_aliases_in_order() {
        let params = json!({ "contact": "John", "message": "hi" });
        assert_eq!(
            param_str(&params, &["to", "contact", "phone"]).as_deref(),
            Some("John")
        );
        assert!(param_str(&params, &["subject"]).is_none());
    }

    #[test]
    fn test_param_list_accepts_string_or_array() {
        let params = json!({ "recipients": ["a@x.com", "b@x.com"], "to": "c@x.com" });
        assert_eq!(param_list(&params, &["recipients"]).len(), 2);
        assert_eq!(param_list(&params, &["to"]), vec!["c@x.com".to_string()]);
        assert!(param_list(&params, &["cc"]).is_empty());
    }

    #[test]
    fn test_bump_field_handles_missing_and_existing_keys() {
        let mut usage = json!({ "calls_today": 3 });
        bump_field(&mut usage, "calls_today", 1);
        bump_field(&mut usage, "calls_failed", 2);
        assert_eq!(usage["calls_today"], 4);
        assert_eq!(usage["calls_failed"], 2);
    }
}
