//! Abstract external service capabilities.
//!
//! Concrete providers (telephony, calendar, email, chat) are out of scope;
//! the orchestrator only ever talks to these traits. An unsuccessful call
//! is data (`success: false` in the outcome), a transport-level problem is
//! a `CapabilityError`. Both mark the sub-task failed; neither is retried.

mod mock;

pub use mock::{MockBehavior, MockCalendar, MockChatNotifier, MockMailer, MockTelephony};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::config::MockConfig;

/// Error from a capability invocation.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Request to place an outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Contact name or number
    pub to: String,
    /// What the call should convey
    pub message: String,
}

/// Outcome of an outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOutcome {
    pub success: bool,
    /// Provider reference for the call, when one was placed
    pub call_ref: Option<String>,
    /// Call duration, human formatted (e.g. `3m 42s`)
    pub duration: Option<String>,
    pub contact_reached: bool,
    /// Short narrative of how the call went
    pub note: String,
}

/// Outcome of an SMS send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsOutcome {
    pub success: bool,
    /// Provider reference for the message, when one was sent
    pub message_ref: Option<String>,
}

/// Request to create a calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub summary: String,
    pub description: Option<String>,
    /// Requested start, free-form (the interpreter passes through whatever
    /// the instruction contained)
    pub when: Option<String>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
}

/// Outcome of a booking attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub success: bool,
    /// Booking reference, when the event was created
    pub booking_ref: Option<String>,
    pub room: Option<String>,
    pub time_slot: Option<String>,
}

/// A concrete availability window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

/// Request to send one or more emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outcome of an email send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailOutcome {
    pub success: bool,
    /// Number of emails actually sent
    pub sent: u32,
    pub delivery_note: String,
    pub tracking_refs: Vec<String>,
}

/// Lifecycle phase reported in a chat notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPhase {
    Started,
    Completed,
    Failed,
}

/// A task status notification posted to the team chat channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNotification {
    pub task_id: Uuid,
    pub instruction: String,
    pub agent_kind: AgentKind,
    pub phase: NotificationPhase,
    /// Result payload for terminal phases
    pub details: Option<serde_json::Value>,
}

/// Outcome of a chat post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyOutcome {
    pub success: bool,
    /// Provider timestamp of the posted message
    pub posted_at: Option<String>,
}

/// Outbound telephony.
#[async_trait]
pub trait Telephony: Send + Sync {
    async fn place_call(&self, request: CallRequest) -> Result<CallOutcome, CapabilityError>;

    async fn send_sms(&self, to: &str, message: &str) -> Result<SmsOutcome, CapabilityError>;
}

/// Calendar management.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn create_event(&self, request: EventRequest) -> Result<EventOutcome, CapabilityError>;

    /// Find open windows of `duration_minutes` between `start` and `end`.
    async fn find_free_slots(
        &self,
        start: &str,
        end: &str,
        duration_minutes: u32,
    ) -> Result<Vec<TimeSlot>, CapabilityError>;
}

/// Email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, request: EmailRequest) -> Result<EmailOutcome, CapabilityError>;
}

/// Team chat notifications.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn post_task_notification(
        &self,
        notification: TaskNotification,
    ) -> Result<NotifyOutcome, CapabilityError>;
}

/// The full set of capabilities the dispatch loop needs.
#[derive(Clone)]
pub struct CapabilitySet {
    pub telephony: Arc<dyn Telephony>,
    pub calendar: Arc<dyn Calendar>,
    pub mailer: Arc<dyn Mailer>,
    pub chat: Arc<dyn ChatNotifier>,
}

impl CapabilitySet {
    /// Build a set of mock capabilities with the configured behavior.
    pub fn mock(config: &MockConfig) -> Self {
        let behavior = MockBehavior::from_config(config);
        Self {
            telephony: Arc::new(MockTelephony::new(behavior.clone())),
            calendar: Arc::new(MockCalendar::new(behavior.clone())),
            mailer: Arc::new(MockMailer::new(behavior.clone())),
            chat: Arc::new(MockChatNotifier::new(behavior)),
        }
    }

    /// Mock capabilities with zero latency that always succeed. For tests.
    #[cfg(test)]
    pub fn deterministic(success: bool) -> Self {
        let behavior = MockBehavior::deterministic(success);
        Self {
            telephony: Arc::new(MockTelephony::new(behavior.clone())),
            calendar: Arc::new(MockCalendar::new(behavior.clone())),
            mailer: Arc::new(MockMailer::new(behavior.clone())),
            chat: Arc::new(MockChatNotifier::new(behavior)),
        }
    }
}
