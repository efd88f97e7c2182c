//! Mock agent registry types.
//!
//! Three specialized agents handle the sub-tasks an instruction decomposes
//! into: communication (phone calls), booking (calendar), follow-up (email).
//! Agents are records in the store; the orchestrator flips their status as
//! work is assigned and completed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// The kind of work an agent handles.
///
/// Mirrors the sub-task `type` the interpreter emits; assignment matches a
/// sub-task to an available agent of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Makes phone calls, handles voice interactions
    Communication,
    /// Schedules meetings, reserves rooms, manages calendar events
    Booking,
    /// Sends emails, manages follow-up communications
    Followup,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Communication => write!(f, "communication"),
            AgentKind::Booking => write!(f, "booking"),
            AgentKind::Followup => write!(f, "followup"),
        }
    }
}

/// Agent availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent has never been assigned work
    Idle,
    /// Agent is available for new work
    Active,
    /// Agent is executing a sub-task
    Busy,
    /// Agent hit an unrecoverable problem
    Error,
}

impl AgentStatus {
    /// Check whether an agent in this status can accept a new sub-task.
    pub fn is_available(&self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Active)
    }
}

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    /// Capability labels shown in the dashboard
    pub capabilities: Vec<String>,
    /// Description of the sub-task currently being executed
    pub current_task: Option<String>,
    /// Per-agent performance counters (shape varies by kind)
    pub stats: serde_json::Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for inserting a new agent.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub kind: AgentKind,
    pub capabilities: Vec<String>,
    pub stats: serde_json::Value,
}

/// The default agent roster, seeded on first start.
pub fn default_agents() -> Vec<NewAgent> {
    vec![
        NewAgent {
            name: "Communication Agent".to_string(),
            kind: AgentKind::Communication,
            capabilities: vec![
                "phone_calls".to_string(),
                "voice_interaction".to_string(),
                "customer_contact".to_string(),
            ],
            stats: json!({ "calls_today": 0, "success_rate": 94, "total_calls": 0 }),
        },
        NewAgent {
            name: "Booking Agent".to_string(),
            kind: AgentKind::Booking,
            capabilities: vec![
                "calendar_management".to_string(),
                "room_booking".to_string(),
                "scheduling".to_string(),
            ],
            stats: json!({ "bookings_today": 0, "availability": 98, "total_bookings": 0 }),
        },
        NewAgent {
            name: "Follow-up Agent".to_string(),
            kind: AgentKind::Followup,
            capabilities: vec![
                "email_sending".to_string(),
                "follow_up_management".to_string(),
                "communication".to_string(),
            ],
            stats: json!({ "emails_sent": 0, "response_rate": 87, "total_emails": 0 }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_covers_all_kinds() {
        let roster = default_agents();
        assert_eq!(roster.len(), 3);
        for kind in [
            AgentKind::Communication,
            AgentKind::Booking,
            AgentKind::Followup,
        ] {
            assert!(roster.iter().any(|a| a.kind == kind));
        }
    }

    #[test]
    fn test_availability() {
        assert!(AgentStatus::Idle.is_available());
        assert!(AgentStatus::Active.is_available());
        assert!(!AgentStatus::Busy.is_available());
        assert!(!AgentStatus::Error.is_available());
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AgentKind::Followup).unwrap(),
            "\"followup\""
        );
        let kind: AgentKind = serde_json::from_str("\"communication\"").unwrap();
        assert_eq!(kind, AgentKind::Communication);
    }
}
