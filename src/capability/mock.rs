//! Mock capability implementations.
//!
//! Each mock sleeps for a random duration inside the configured window,
//! then succeeds with the configured probability, fabricating result
//! payloads in the shape a real provider would return.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

use super::{
    CallOutcome, CallRequest, Calendar, CapabilityError, ChatNotifier, EmailOutcome, EmailRequest,
    EventOutcome, EventRequest, Mailer, NotifyOutcome, SmsOutcome, TaskNotification, Telephony,
    TimeSlot,
};
use crate::config::MockConfig;

/// Behavior knobs shared by all mock capabilities.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    success_rate: f64,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl MockBehavior {
    pub fn from_config(config: &MockConfig) -> Self {
        Self {
            success_rate: config.success_rate.clamp(0.0, 1.0),
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Zero-latency behavior that always succeeds (or always fails).
    pub fn deterministic(success: bool) -> Self {
        Self {
            success_rate: if success { 1.0 } else { 0.0 },
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Sleep for a random duration inside the configured window.
    async fn simulate_latency(&self) {
        if self.max_delay_ms == 0 {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.min_delay_ms..=self.max_delay_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Roll the dice for this invocation.
    fn roll_success(&self) -> bool {
        rand::thread_rng().gen_bool(self.success_rate)
    }
}

fn short_ref(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

/// Simulated telephony provider.
pub struct MockTelephony {
    behavior: MockBehavior,
}

impl MockTelephony {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn place_call(&self, request: CallRequest) -> Result<CallOutcome, CapabilityError> {
        self.behavior.simulate_latency().await;

        if self.behavior.roll_success() {
            let duration = {
                let mut rng = rand::thread_rng();
                format!("{}m {}s", rng.gen_range(1..=5), rng.gen_range(0..60))
            };
            tracing::debug!(to = %request.to, "simulated call connected");
            Ok(CallOutcome {
                success: true,
                call_ref: Some(short_ref("CA")),
                duration: Some(duration),
                contact_reached: true,
                note: "Contact confirmed meeting availability".to_string(),
            })
        } else {
            Ok(CallOutcome {
                success: false,
                call_ref: Some(short_ref("CA")),
                duration: None,
                contact_reached: false,
                note: "No answer, left voicemail".to_string(),
            })
        }
    }

    async fn send_sms(&self, to: &str, message: &str) -> Result<SmsOutcome, CapabilityError> {
        self.behavior.simulate_latency().await;

        if self.behavior.roll_success() {
            tracing::debug!(to, len = message.len(), "simulated sms sent");
            Ok(SmsOutcome {
                success: true,
                message_ref: Some(short_ref("SM")),
            })
        } else {
            Ok(SmsOutcome {
                success: false,
                message_ref: None,
            })
        }
    }
}

/// Simulated calendar provider.
pub struct MockCalendar {
    behavior: MockBehavior,
}

impl MockCalendar {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl Calendar for MockCalendar {
    async fn create_event(&self, request: EventRequest) -> Result<EventOutcome, CapabilityError> {
        self.behavior.simulate_latency().await;

        if self.behavior.roll_success() {
            let room = {
                let mut rng = rand::thread_rng();
                format!("Conference Room {}", rng.gen_range(1..=5))
            };
            tracing::debug!(summary = %request.summary, room = %room, "simulated event created");
            Ok(EventOutcome {
                success: true,
                booking_ref: Some(short_ref("BK")),
                room: Some(room),
                time_slot: Some(
                    request
                        .when
                        .unwrap_or_else(|| "Tuesday 2:00 PM - 3:00 PM".to_string()),
                ),
            })
        } else {
            Ok(EventOutcome {
                success: false,
                booking_ref: None,
                room: None,
                time_slot: None,
            })
        }
    }

    async fn find_free_slots(
        &self,
        start: &str,
        end: &str,
        duration_minutes: u32,
    ) -> Result<Vec<TimeSlot>, CapabilityError> {
        self.behavior.simulate_latency().await;
        let _ = (start, end, duration_minutes);

        Ok(vec![
            TimeSlot {
                start: "2024-01-23T14:00:00Z".to_string(),
                end: "2024-01-23T15:00:00Z".to_string(),
            },
            TimeSlot {
                start: "2024-01-24T10:00:00Z".to_string(),
                end: "2024-01-24T11:00:00Z".to_string(),
            },
            TimeSlot {
                start: "2024-01-24T15:30:00Z".to_string(),
                end: "2024-01-24T16:30:00Z".to_string(),
            },
        ])
    }
}

/// Simulated email provider.
pub struct MockMailer {
    behavior: MockBehavior,
}

impl MockMailer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_email(&self, request: EmailRequest) -> Result<EmailOutcome, CapabilityError> {
        self.behavior.simulate_latency().await;

        if self.behavior.roll_success() {
            let sent = if request.to.is_empty() {
                rand::thread_rng().gen_range(1..=3)
            } else {
                request.to.len() as u32
            };
            let tracking_refs = (0..sent).map(|_| short_ref("TRK")).collect();
            Ok(EmailOutcome {
                success: true,
                sent,
                delivery_note: "All emails delivered successfully".to_string(),
                tracking_refs,
            })
        } else {
            Ok(EmailOutcome {
                success: false,
                sent: 0,
                delivery_note: "Some emails failed to send".to_string(),
                tracking_refs: vec![],
            })
        }
    }
}

/// Simulated team chat provider.
pub struct MockChatNotifier {
    behavior: MockBehavior,
}

impl MockChatNotifier {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl ChatNotifier for MockChatNotifier {
    async fn post_task_notification(
        &self,
        notification: TaskNotification,
    ) -> Result<NotifyOutcome, CapabilityError> {
        // Notifications are best-effort side channel; no latency window.
        tracing::debug!(
            task_id = %notification.task_id,
            agent = %notification.agent_kind,
            phase = ?notification.phase,
            "simulated chat notification"
        );
        if self.behavior.roll_success() {
            Ok(NotifyOutcome {
                success: true,
                posted_at: Some(Utc::now().to_rfc3339()),
            })
        } else {
            Ok(NotifyOutcome {
                success: false,
                posted_at: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_success_shapes() {
        let telephony = MockTelephony::new(MockBehavior::deterministic(true));
        let outcome = telephony
            .place_call(CallRequest {
                to: "John".to_string(),
                message: "meeting tomorrow".to_string(),
            })
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.contact_reached);
        assert!(outcome.call_ref.unwrap().starts_with("CA-"));
        assert!(outcome.duration.is_some());
    }

    #[tokio::test]
    async fn test_sms_refs_only_on_success() {
        let telephony = MockTelephony::new(MockBehavior::deterministic(true));
        let sent = telephony.send_sms("+15550100", "running late").await.unwrap();
        assert!(sent.success);
        assert!(sent.message_ref.unwrap().starts_with("SM-"));

        let telephony = MockTelephony::new(MockBehavior::deterministic(false));
        let failed = telephony.send_sms("+15550100", "running late").await.unwrap();
        assert!(!failed.success);
        assert!(failed.message_ref.is_none());
    }

    #[tokio::test]
    async fn test_deterministic_failure_shapes() {
        let calendar = MockCalendar::new(MockBehavior::deterministic(false));
        let outcome = calendar
            .create_event(EventRequest {
                summary: "Planning".to_string(),
                description: None,
                when: None,
                attendees: vec![],
                location: None,
            })
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.booking_ref.is_none());
    }

    #[tokio::test]
    async fn test_mailer_counts_explicit_recipients() {
        let mailer = MockMailer::new(MockBehavior::deterministic(true));
        let outcome = mailer
            .send_email(EmailRequest {
                to: vec!["a@example.com".to_string(), "b@example.com".to_string()],
                subject: "Recap".to_string(),
                body: "notes".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.tracking_refs.len(), 2);
    }

    #[tokio::test]
    async fn test_free_slots_are_well_formed() {
        let calendar = MockCalendar::new(MockBehavior::deterministic(true));
        let slots = calendar
            .find_free_slots("2024-01-23", "2024-01-25", 60)
            .await
            .unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s.start < s.end));
    }
}
