//! Instruction interpreter - natural language in, typed plan out.
//!
//! Asks the language model to decompose a free-text instruction into typed
//! steps with a declared execution order, then normalizes the reply. The
//! trait seam lets tests script plans without a network.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, TokenUsage};
use crate::task::InstructionPlan;

/// System prompt for the decomposition request.
///
/// The reply contract matches `InstructionPlan`'s wire shape exactly.
const SYSTEM_PROMPT: &str = r#"You are an AI agent orchestrator. Break down natural language instructions into specific tasks for specialized agents.

Available agent types:
- communication: Makes phone calls, handles voice interactions
- booking: Schedules meetings, reserves rooms, manages calendar events
- followup: Sends emails, manages follow-up communications

Respond with JSON in this exact format:
{
  "intent": "brief description of the overall goal",
  "tasks": [
    {
      "type": "agent_type",
      "action": "specific_action",
      "description": "detailed description",
      "parameters": {"key": "value"},
      "priority": 1-10,
      "dependencies": ["optional_task_references"]
    }
  ],
  "confidence": 0.0-1.0,
  "executionOrder": [0, 1, 2]
}

Make tasks specific and actionable. Include all relevant parameters."#;

/// Errors from instruction interpretation.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model reply was not a valid plan: {0}")]
    MalformedReply(String),
}

/// An interpreted instruction together with what it cost.
#[derive(Debug, Clone)]
pub struct Interpretation {
    pub plan: InstructionPlan,
    /// Token usage of the decomposition call, when the provider reports it
    pub usage: Option<TokenUsage>,
}

/// Turns free-text instructions into typed plans.
#[async_trait]
pub trait InstructionInterpreter: Send + Sync {
    async fn interpret(&self, instruction: &str) -> Result<Interpretation, InterpretError>;
}

/// LLM-backed interpreter.
pub struct LlmInterpreter {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl LlmInterpreter {
    pub fn new(llm: Arc<dyn LlmClient>, model: String) -> Self {
        Self { llm, model }
    }
}

#[async_trait]
impl InstructionInterpreter for LlmInterpreter {
    async fn interpret(&self, instruction: &str) -> Result<Interpretation, InterpretError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(instruction),
            ],
            json_response: true,
        };

        let response = self.llm.chat(request).await?;

        let plan: InstructionPlan = serde_json::from_str(&response.content)
            .map_err(|e| InterpretError::MalformedReply(format!("{}", e)))?;

        Ok(Interpretation {
            plan: plan.normalized(),
            usage: response.usage,
        })
    }
}

/// Canned example instructions for the dashboard's quick-start panel.
pub fn quick_examples() -> Vec<&'static str> {
    vec![
        "Schedule team meeting for next Tuesday at 2 PM and send invitations to all team members",
        "Follow up on the proposal we sent last week with a phone call and email reminder",
        "Book travel arrangements for the conference next month including flight and hotel",
        "Call the client to discuss project timeline and then schedule a follow-up meeting",
        "Reserve the main conference room for tomorrow's presentation and notify all attendees",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;

    /// LLM stub that replays a canned reply.
    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 120,
                    completion_tokens: 80,
                    total_tokens: 200,
                }),
            })
        }
    }

    fn interpreter_with(reply: &str) -> LlmInterpreter {
        LlmInterpreter::new(
            Arc::new(ScriptedLlm {
                reply: reply.to_string(),
            }),
            "gpt-4o".to_string(),
        )
    }

    #[tokio::test]
    async fn test_interprets_well_formed_reply() {
        let reply = r#"{
            "intent": "book a room and tell the team",
            "tasks": [
                {"type": "booking", "action": "book_room", "description": "Reserve the main room", "parameters": {"room": "main"}, "priority": 7},
                {"type": "followup", "action": "send_email", "description": "Notify attendees", "parameters": {}}
            ],
            "confidence": 0.95,
            "executionOrder": [0, 1]
        }"#;

        let interpretation = interpreter_with(reply).interpret("reserve the main room").await.unwrap();
        assert_eq!(interpretation.plan.steps.len(), 2);
        assert_eq!(interpretation.plan.execution_order, vec![0, 1]);
        assert_eq!(interpretation.usage.unwrap().total_tokens, 200);
    }

    #[tokio::test]
    async fn test_missing_order_defaults_to_declaration_order() {
        let reply = r#"{
            "intent": "call someone",
            "tasks": [
                {"type": "communication", "action": "place_call", "description": "Call John"}
            ],
            "confidence": 1.8
        }"#;

        let interpretation = interpreter_with(reply).interpret("call John").await.unwrap();
        assert_eq!(interpretation.plan.execution_order, vec![0]);
        assert_eq!(interpretation.plan.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_an_error() {
        let err = interpreter_with("I cannot help with that.")
            .interpret("call John")
            .await
            .unwrap_err();
        assert!(matches!(err, InterpretError::MalformedReply(_)));
    }

    #[test]
    fn test_quick_examples_non_empty() {
        assert_eq!(quick_examples().len(), 5);
    }
}
