//! LLM client module for interacting with language models.
//!
//! Provides a trait-based abstraction over chat-completion providers, with
//! OpenAI as the primary implementation. The instruction interpreter is the
//! only consumer; it asks for strict JSON replies.

mod error;
mod openai;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier (provider format, e.g. `gpt-4o`)
    pub model: String,

    /// Conversation messages, system prompt first
    pub messages: Vec<ChatMessage>,

    /// Ask the provider to return a single JSON object
    pub json_response: bool,
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant reply content
    pub content: String,

    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Trait for LLM chat providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Execute a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}
