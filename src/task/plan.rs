//! Interpreted instruction plans.
//!
//! The interpreter asks the language model for a JSON object matching these
//! types. Model output is untrusted: deserialization fills gaps with
//! defaults and `normalized()` repairs the rest. Declared step dependencies
//! are recorded verbatim and never enforced by dispatch.

use serde::{Deserialize, Serialize};

use crate::agents::AgentKind;

/// A single planned step of an instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    /// Which agent kind handles this step
    #[serde(rename = "type")]
    pub kind: AgentKind,

    /// Machine-readable action name (e.g. `place_call`, `book_room`)
    pub action: String,

    /// Human-readable description of the step
    pub description: String,

    /// Free-form action parameters extracted from the instruction
    #[serde(default)]
    pub parameters: serde_json::Value,

    /// Relative priority in 1-10
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// References to steps this one depends on. Parsed, never enforced.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_priority() -> u8 {
    5
}

/// The full decomposition of one instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstructionPlan {
    /// Brief description of the overall goal
    #[serde(default = "default_intent")]
    pub intent: String,

    /// Typed steps, in declaration order
    #[serde(default, rename = "tasks")]
    pub steps: Vec<PlannedStep>,

    /// Model confidence in [0.0, 1.0]
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Indices into `steps`, in dispatch order
    #[serde(default, rename = "executionOrder")]
    pub execution_order: Vec<usize>,
}

fn default_intent() -> String {
    "Unknown intent".to_string()
}

fn default_confidence() -> f64 {
    0.8
}

impl InstructionPlan {
    /// Repair a freshly parsed plan.
    ///
    /// Clamps confidence to [0.0, 1.0] and defaults an empty execution
    /// order to declaration order. Out-of-range indices are left in place;
    /// dispatch skips them.
    pub fn normalized(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        if self.execution_order.is_empty() {
            self.execution_order = (0..self.steps.len()).collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_plan() {
        let raw = json!({
            "intent": "call a contact and book a room",
            "tasks": [
                {
                    "type": "communication",
                    "action": "place_call",
                    "description": "Call John about the meeting",
                    "parameters": { "to": "John" },
                    "priority": 8
                },
                {
                    "type": "booking",
                    "action": "book_room",
                    "description": "Reserve a conference room",
                    "dependencies": ["0"]
                }
            ],
            "confidence": 0.92,
            "executionOrder": [0, 1]
        });

        let plan: InstructionPlan = serde_json::from_value(raw).unwrap();
        let plan = plan.normalized();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].kind, AgentKind::Communication);
        assert_eq!(plan.steps[1].priority, 5);
        assert_eq!(plan.steps[1].dependencies, vec!["0".to_string()]);
        assert_eq!(plan.execution_order, vec![0, 1]);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = json!({
            "tasks": [
                { "type": "followup", "action": "send_email", "description": "Send a recap" }
            ]
        });

        let plan: InstructionPlan = serde_json::from_value(raw).unwrap();
        let plan = plan.normalized();

        assert_eq!(plan.intent, "Unknown intent");
        assert_eq!(plan.confidence, 0.8);
        assert_eq!(plan.execution_order, vec![0]);
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = json!({ "tasks": [], "confidence": 3.5 });
        let plan: InstructionPlan = serde_json::from_value(raw).unwrap();
        assert_eq!(plan.normalized().confidence, 1.0);
    }

    #[test]
    fn test_empty_plan_is_valid() {
        let plan: InstructionPlan = serde_json::from_value(json!({})).unwrap();
        let plan = plan.normalized();
        assert!(plan.steps.is_empty());
        assert!(plan.execution_order.is_empty());
    }

    #[test]
    fn test_unknown_agent_kind_rejected() {
        let raw = json!({
            "tasks": [ { "type": "janitor", "action": "sweep", "description": "nope" } ]
        });
        assert!(serde_json::from_value::<InstructionPlan>(raw).is_err());
    }
}
